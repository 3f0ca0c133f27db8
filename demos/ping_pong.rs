//! Ping Pong - a server procedure answered by a client procedure.
//!
//! This example demonstrates:
//! - Declaring a behaviour type with one `ServerRpc` and one `ClientRpc`
//! - Running a validator on a server and on a client over the loopback network
//! - Targeting the reply at the caller with `ClientRpcParams`
//!
//! Run with `RUST_LOG=netcode_rpc=debug cargo run --example ping_pong` to
//! see the patching and dispatch logs.

use std::sync::{Arc, Mutex};

use netcode_rpc::codec::{Args, Parameter};
use netcode_rpc::handler::{CallInfo, ClientRpcParams};
use netcode_rpc::spawn::{BehaviourRef, NetworkBehaviour, NetworkObject, SpawnManager};
use netcode_rpc::transport::{ClientId, LoopbackNetwork, Transport};
use netcode_rpc::validator::{BehaviourType, MethodDecl};
use netcode_rpc::{NetcodeValidator, ValidatorRegistry};

/// Pings received on the server, waiting for a pong.
type Pending = Arc<Mutex<Vec<(ClientId, u32)>>>;

#[derive(Default)]
struct Paddle {
    pending: Pending,
    pongs: Vec<u32>,
}

impl NetworkBehaviour for Paddle {}

fn paddle_type() -> BehaviourType {
    BehaviourType::new::<Paddle>("Paddle")
        .method(
            MethodDecl::new("PingServerRpc", |p: &mut Paddle, mut args: Args, info: &CallInfo| {
                let round = args.take::<u32>(0).unwrap_or_default();
                tracing::info!(round, from = info.sender, "ping");
                if let Ok(mut pending) = p.pending.lock() {
                    pending.push((info.sender, round));
                }
            })
            .server_rpc()
            .param(Parameter::of::<u32>("round")),
        )
        .method(
            MethodDecl::new("PongClientRpc", |p: &mut Paddle, mut args: Args, _: &CallInfo| {
                let round = args.take::<u32>(0).unwrap_or_default();
                tracing::info!(round, "pong");
                p.pongs.push(round);
            })
            .client_rpc()
            .param(Parameter::of::<u32>("round"))
            .param(Parameter::of::<ClientRpcParams>("rpc_params")),
        )
}

fn world(owner: ClientId, pending: Pending) -> SpawnManager {
    let mut world = SpawnManager::new();
    world.spawn(NetworkObject::with_owner(1, owner).with_behaviour(Paddle {
        pending,
        pongs: Vec::new(),
    }));
    world
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let net = LoopbackNetwork::new();
    let server = net.start_server();
    let client = net.connect_client();
    let paddle = BehaviourRef::new(1, 0);

    let server_registry = ValidatorRegistry::new();
    let mut on_server = NetcodeValidator::new("demo.pingpong", &server_registry)?;
    on_server.patch(paddle_type())?;
    on_server.transport_started(server.clone());

    let client_registry = ValidatorRegistry::new();
    let mut on_client = NetcodeValidator::new("demo.pingpong", &client_registry)?;
    on_client.patch(paddle_type())?;
    on_client.transport_started(client.clone());

    let pending = Pending::default();
    let mut server_world = world(client.local_id(), pending.clone());
    let mut client_world = world(client.local_id(), Pending::default());

    for round in 1..=3u32 {
        on_client.call(&mut client_world, paddle, "PingServerRpc", Args::new().with(round))?;
        server.poll_next(&mut server_world).await;

        let answered = pending.lock().map(|mut p| std::mem::take(&mut *p)).unwrap_or_default();
        for (caller, round) in answered {
            let args = Args::new().with(round).with(ClientRpcParams::to_clients([caller]));
            on_server.call(&mut server_world, paddle, "PongClientRpc", args)?;
        }
        client.poll_next(&mut client_world).await;
    }

    let pongs = client_world.get::<Paddle>(paddle).map(|p| p.pongs.clone()).unwrap_or_default();
    println!("Client received pongs: {:?}", pongs);

    on_client.dispose();
    on_server.dispose();
    Ok(())
}
