// Library exports for the arm controller simulator

use std::error::Error;
use std::sync::Arc;

use arm_link::packets::{Command, CommandKind, ControllerReply, Param, ReplyCode};
use arm_link::LinkError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// What the simulated controller believes the arm is doing.
#[derive(Clone, Debug, PartialEq)]
pub struct ArmState {
    pub joints: [f64; 5],
    pub position: [f64; 3],
    pub speed: f64,
    pub gripper_closed: bool,
    pub calibrating: bool,
    pub calibration_targets: [f64; 3],
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            joints: [0.0; 5],
            position: [0.0; 3],
            speed: 50.0,
            gripper_closed: false,
            calibrating: false,
            calibration_targets: [0.0; 3],
        }
    }
}

impl ArmState {
    pub fn apply(&mut self, command: &Command) {
        let values: Vec<f64> = command
            .params()
            .iter()
            .filter_map(|param| match param {
                Param::Number(value) => Some(*value),
                Param::Text(text) => text.parse().ok(),
            })
            .collect();

        match command.kind() {
            CommandKind::JointMove => copy_into(&mut self.joints, &values),
            CommandKind::XyzMove => copy_into(&mut self.position, &values),
            CommandKind::SetSpeed => self.speed = values.first().copied().unwrap_or(self.speed),
            CommandKind::EnterCalibration => self.calibrating = true,
            CommandKind::ExitCalibration => self.calibrating = false,
            CommandKind::OpenGripper => self.gripper_closed = false,
            CommandKind::CloseGripper => self.gripper_closed = true,
            CommandKind::CalibrateTargets => copy_into(&mut self.calibration_targets, &values),
        }
    }
}

fn copy_into<const N: usize>(target: &mut [f64; N], values: &[f64]) {
    for (slot, value) in target.iter_mut().zip(values) {
        *slot = *value;
    }
}

/// Decodes one inbound message and produces the controller's reply.
pub fn reply_for(request: &str, state: &mut ArmState) -> ControllerReply {
    match request.parse::<Command>() {
        Ok(command) => {
            state.apply(&command);
            ControllerReply::ok("")
        }
        Err(LinkError::UnknownCommandKind(tag)) => ControllerReply {
            code: ReplyCode::UnknownCommand,
            context: format!("Command with identifier: {} not found.", tag),
        },
        Err(e) => ControllerReply::error(ReplyCode::UnknownError, &e),
    }
}

async fn handle_client(
    socket: TcpStream,
    arm: Arc<Mutex<ArmState>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let peer = socket.peer_addr()?;
    let mut ws = accept_async(socket).await?;
    info!("Console connected from {}", peer);

    while let Some(message) = ws.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        info!("Received: {}", text);

        let reply = {
            let mut arm = arm.lock().await;
            let reply = reply_for(&text, &mut arm);
            info!("Arm state: {:?}", *arm);
            reply
        };
        if !reply.code.is_ok() {
            warn!("Rejected {:?}: {}", text, reply);
        }
        ws.send(Message::Text(reply.to_wire())).await?;
    }

    info!("Console {} disconnected", peer);
    Ok(())
}

/// Accepts consoles forever, one task per connection, all sharing one arm.
pub async fn serve(listener: TcpListener) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Listening on {}", listener.local_addr()?);
    let arm = Arc::new(Mutex::new(ArmState::default()));

    loop {
        let socket = match listener.accept().await {
            Ok((socket, _)) => socket,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let arm = Arc::clone(&arm);
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, arm).await {
                error!("Error handling console: {:?}", e);
            }
        });
    }
}
