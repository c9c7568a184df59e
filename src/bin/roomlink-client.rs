//! RoomLink demo client
//!
//! Connects, joins the configured room, spawns one object and walks it
//! around randomly while logging what the rest of the room does.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomlink::{
    config::{ClientArgs, ClientConfig},
    NetworkObjectId, Pose, RoomClient, SessionEvent, Vec3, VERSION,
};

/// Largest step per tick on each axis.
const STEP: f32 = 0.25;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ClientArgs::parse();
    let config = ClientConfig::load(&args).context("loading client configuration")?;
    info!("RoomLink Client v{}", VERSION);

    let mut client = RoomClient::connect(&config)
        .await
        .with_context(|| format!("connecting to {}:{}", config.address, config.port))?;

    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(config.tick_rate.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut rng = rand::thread_rng();
    let mut ball: Option<(NetworkObjectId, Vec3)> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving");
                break;
            }
        }

        for event in client.tick() {
            match event {
                SessionEvent::ConnectedToServer(actor_id) => {
                    info!("Connected as {}", actor_id);
                    client.join_room(&config.user_name, &config.room)?;
                }
                SessionEvent::JoinedRoom { actor_id, user_name, group_name } => {
                    info!("{} '{}' joined '{}'", actor_id, user_name, group_name);
                    if Some(actor_id) == client.session().actor() && ball.is_none() {
                        let id = client.network_instantiate("Ball", Pose::IDENTITY)?;
                        info!("Spawned {}", id);
                        ball = Some((id, Vec3::default()));
                    }
                }
                SessionEvent::PlayerLeftRoom(actor_id) => info!("{} left", actor_id),
                SessionEvent::NetworkObjectCreated { object_id, type_key, .. } => {
                    info!("Remote {} '{}' appeared", object_id, type_key);
                }
                SessionEvent::NetworkObjectsRemoved(ids) => info!("{} objects removed", ids.len()),
                SessionEvent::DisconnectedFromServer => {
                    warn!("Lost connection to server");
                    return Ok(());
                }
                _ => {}
            }
        }

        if let Some((id, position)) = ball.as_mut() {
            position.x += rng.gen_range(-STEP..=STEP);
            position.z += rng.gen_range(-STEP..=STEP);
            client.set_object_pose(*id, Pose::at(*position))?;
        }
    }

    if client.session().is_joined() {
        client.leave_room()?;
        client.tick();
    }
    Ok(())
}
