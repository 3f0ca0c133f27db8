//! The interception point.
//!
//! Every call to a registered procedure goes through [`Dispatcher::intercept`],
//! whether it comes from local code or from a received frame. The origin read
//! from the [`InvocationContext`] picks the path:
//!
//! - local call: check authority, encode the arguments and send them; the
//!   body does not run here
//! - network arrival: check the server role, decode the pending frame and
//!   let the body run with the decoded arguments
//!
//! Failures are logged and returned as values so one bad call or frame
//! never takes the host down.

use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};

use super::context::{Arrival, CallInfo, InvocationContext, Origin};
use super::registry::{ClientRpcParams, ProcedureDescriptor, ProcedureEntry, ProcedureLookup};
use crate::classifier::Role;
use crate::codec::Args;
use crate::config::ValidatorConfig;
use crate::error::{caller_label, RpcError, Result};
use crate::protocol::{encode_call, FrameHeader, FrameReader};
use crate::spawn::{behaviour_type_id, BehaviourRef, ObjectRegistry};
use crate::transport::{ClientId, Transport, SERVER_CLIENT_ID};

/// Decision taken at the interception point.
#[derive(Debug)]
pub enum Intercept {
    /// Run the original body with these arguments.
    Proceed(Args),
    /// Arguments were sent; the body must not run locally.
    Transmitted,
    /// Call suppressed.
    Rejected(RpcError),
}

impl Intercept {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Intercept::Proceed(_))
    }

    pub fn is_transmitted(&self) -> bool {
        matches!(self, Intercept::Transmitted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Intercept::Rejected(_))
    }
}

/// Result of a call that made it through interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The body ran locally.
    Invoked,
    /// A frame was sent to the remote side.
    Transmitted,
}

fn reject(err: RpcError) -> RpcError {
    tracing::error!("{}", err);
    err
}

/// Stateless dispatch over borrowed collaborators.
pub struct Dispatcher<'t> {
    transport: Option<&'t dyn Transport>,
    config: &'t ValidatorConfig,
    last_sender: Option<&'t AtomicU64>,
}

impl<'t> Dispatcher<'t> {
    /// `transport` is `None` while the host has no running transport.
    pub fn new(transport: Option<&'t dyn Transport>, config: &'t ValidatorConfig) -> Self {
        Self {
            transport,
            config,
            last_sender: None,
        }
    }

    /// Record the sender of every accepted frame in `slot`.
    pub fn with_last_sender(mut self, slot: &'t AtomicU64) -> Self {
        self.last_sender = Some(slot);
        self
    }

    /// Decide what happens to one intercepted call.
    ///
    /// Consumes the context's origin. `args` are the caller-supplied
    /// arguments and are only read on the local path.
    pub fn intercept(
        &self,
        ctx: &mut InvocationContext<'_>,
        objects: &dyn ObjectRegistry,
        target: BehaviourRef,
        descriptor: &ProcedureDescriptor,
        args: &Args,
    ) -> Intercept {
        let transport = match self.transport {
            Some(t) if t.is_active() => t,
            _ => {
                return Intercept::Rejected(reject(RpcError::TransportInactive {
                    object_id: target.object_id,
                    behaviour_id: target.behaviour_id,
                }))
            }
        };

        match ctx.take_origin() {
            Origin::LocalCall => match self.transmit(transport, objects, target, descriptor, args) {
                Ok(()) => Intercept::Transmitted,
                Err(e) => Intercept::Rejected(reject(e)),
            },
            Origin::NetworkArrival(arrival) => match self.accept(transport, descriptor, arrival) {
                Ok(decoded) => Intercept::Proceed(decoded),
                Err(e) => Intercept::Rejected(reject(e)),
            },
        }
    }

    fn transmit(
        &self,
        transport: &dyn Transport,
        objects: &dyn ObjectRegistry,
        target: BehaviourRef,
        descriptor: &ProcedureDescriptor,
        args: &Args,
    ) -> Result<()> {
        let role = descriptor
            .role()
            .ok_or_else(|| RpcError::MethodPatchedButLacksAttributes(descriptor.identity()))?;

        let owner = objects
            .owner_of(target.object_id)
            .ok_or(RpcError::RpcCalledBeforeObjectSpawned(target.object_id))?;

        match role {
            Role::Server if descriptor.requires_ownership() && transport.local_id() != owner => {
                return Err(RpcError::NotOwner {
                    caller: caller_label(None),
                    method: descriptor.method_name.clone(),
                    object_id: target.object_id,
                });
            }
            Role::Client if !transport.is_authority() => {
                return Err(RpcError::ClientRpcFromClient(descriptor.method_name.clone()));
            }
            _ => {}
        }

        let header = FrameHeader::new(target.object_id, target.behaviour_id, descriptor.method_name.as_str());
        let frame = encode_call(
            &header,
            &descriptor.parameters,
            args,
            self.config.scratch_buffer_size,
            self.config.frame_bytes_per_parameter,
        )?;
        let channel = self.config.channel_name(&descriptor.owning_type);
        let delivery = descriptor.delivery();

        match role {
            Role::Server => transport.send_unicast(&channel, SERVER_CLIENT_ID, frame, delivery),
            Role::Client => match targeted_clients(descriptor, args) {
                Some(ids) => transport.send_to_list(&channel, ids, frame, delivery),
                None => transport.send_broadcast(&channel, frame, delivery),
            },
        }
    }

    fn accept(&self, transport: &dyn Transport, descriptor: &ProcedureDescriptor, arrival: Arrival<'_>) -> Result<Args> {
        let role = descriptor
            .role()
            .ok_or_else(|| RpcError::MethodPatchedAndNetworkCalledButLacksAttributes(descriptor.identity()))?;

        if role == Role::Server && !transport.is_authority() {
            return Err(RpcError::ServerRpcOnClient {
                type_name: descriptor.owning_type.clone(),
                method: descriptor.method_name.clone(),
            });
        }

        let mut frame = arrival.frame;
        frame.read_arguments(&descriptor.method_name, &descriptor.parameters)
    }

    /// Call a procedure from local code.
    ///
    /// Resolves the target behaviour and its procedure, then intercepts.
    pub fn call(
        &self,
        procedures: &dyn ProcedureLookup,
        objects: &mut dyn ObjectRegistry,
        target: BehaviourRef,
        method: &str,
        args: Args,
    ) -> Result<CallOutcome> {
        let entry = self.resolve(procedures, objects, target, method, |owner, type_name| {
            RpcError::UnknownProcedure {
                type_name: type_name.unwrap_or_else(|| format!("{:?}", owner)),
                method: method.to_string(),
            }
        })?;
        let caller = self.transport.map_or(SERVER_CLIENT_ID, |t| t.local_id());
        self.invoke(&entry, objects, InvocationContext::local(), target, args, caller)
    }

    /// Handle one received frame.
    ///
    /// Resolves the target from the header, re-checks server-role authority
    /// and ownership against the sender, refuses client procedures not sent
    /// by the server, then replays the call through
    /// [`Dispatcher::intercept`] as a network arrival.
    pub fn receive(
        &self,
        procedures: &dyn ProcedureLookup,
        objects: &mut dyn ObjectRegistry,
        sender: ClientId,
        payload: &[u8],
    ) -> Result<CallOutcome> {
        let mut frame = FrameReader::new(payload);
        let header = frame.read_header().map_err(reject)?;
        let target = BehaviourRef::new(header.target_object_id, header.target_behaviour_id);

        let entry = self.resolve(procedures, objects, target, &header.method_name, |owner, type_name| {
            RpcError::NetworkCalledNonExistentMethod {
                behaviour_id: target.behaviour_id,
                method: header.method_name.clone(),
                type_name: type_name.unwrap_or_else(|| format!("{:?}", owner)),
            }
        })?;
        let descriptor = &entry.descriptor;

        match descriptor.role() {
            Some(Role::Server) => {
                let authority = self.transport.is_some_and(|t| t.is_authority());
                if !authority {
                    return Err(reject(RpcError::ServerRpcOnClient {
                        type_name: descriptor.owning_type.clone(),
                        method: descriptor.method_name.clone(),
                    }));
                }
                if descriptor.requires_ownership() && objects.owner_of(target.object_id) != Some(sender) {
                    return Err(reject(RpcError::NotOwner {
                        caller: caller_label(Some(sender)),
                        method: descriptor.method_name.clone(),
                        object_id: target.object_id,
                    }));
                }
            }
            Some(Role::Client) if sender != SERVER_CLIENT_ID => {
                return Err(reject(RpcError::ClientRpcFromNonServer {
                    method: descriptor.method_name.clone(),
                    sender,
                }));
            }
            _ => {}
        }

        if let Some(slot) = self.last_sender {
            slot.store(sender, Ordering::Release);
        }

        let placeholder = Args::nulls(descriptor.arity());
        self.invoke(&entry, objects, InvocationContext::arrival(sender, frame), target, placeholder, sender)
    }

    fn resolve<F>(
        &self,
        procedures: &dyn ProcedureLookup,
        objects: &dyn ObjectRegistry,
        target: BehaviourRef,
        method: &str,
        missing: F,
    ) -> Result<ProcedureEntry>
    where
        F: FnOnce(TypeId, Option<String>) -> RpcError,
    {
        if !objects.is_spawned(target.object_id) {
            return Err(reject(RpcError::RpcCalledBeforeObjectSpawned(target.object_id)));
        }
        let owner = objects
            .behaviour(target)
            .map(behaviour_type_id)
            .ok_or_else(|| {
                reject(RpcError::BehaviourNotFound {
                    object_id: target.object_id,
                    behaviour_id: target.behaviour_id,
                })
            })?;

        procedures
            .lookup(owner, method)
            .ok_or_else(|| reject(missing(owner, procedures.type_name(owner))))
    }

    fn invoke(
        &self,
        entry: &ProcedureEntry,
        objects: &mut dyn ObjectRegistry,
        mut ctx: InvocationContext<'_>,
        target: BehaviourRef,
        args: Args,
        sender: ClientId,
    ) -> Result<CallOutcome> {
        let decoded = match self.intercept(&mut ctx, &*objects, target, &entry.descriptor, &args) {
            Intercept::Proceed(decoded) => decoded,
            Intercept::Transmitted => return Ok(CallOutcome::Transmitted),
            Intercept::Rejected(e) => return Err(e),
        };

        let behaviour = objects.behaviour_mut(target).ok_or_else(|| {
            reject(RpcError::BehaviourNotFound {
                object_id: target.object_id,
                behaviour_id: target.behaviour_id,
            })
        })?;

        tracing::trace!(procedure = %entry.descriptor.identity(), sender, "Invoking");
        entry
            .body
            .call(behaviour, decoded, &CallInfo { target, sender })
            .map_err(reject)?;
        Ok(CallOutcome::Invoked)
    }
}

fn targeted_clients<'a>(descriptor: &ProcedureDescriptor, args: &'a Args) -> Option<&'a [ClientId]> {
    if !descriptor.has_client_rpc_params() {
        return None;
    }
    args.get::<ClientRpcParams>(descriptor.arity() - 1)?
        .target_client_ids
        .as_deref()
}
