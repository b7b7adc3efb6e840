use crate::protocol::Command;

/// Inputs the arbiter folds on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalInput {
    /// The session allows user interaction at all.
    pub interactive: bool,
    /// The control channel is currently connected.
    pub connected: bool,
    /// External recording flag; its rising edge seizes control.
    pub recording: bool,
    /// External exfiltration flag; toggles begin/end commands.
    pub exfiltrate: bool,
}

/// Decides which control commands to emit as interactivity, user intent,
/// recording, and connection state move. Commands are fire-and-forget and
/// idempotent on the agent side; the arbiter only suppresses sends whose
/// desired state is unchanged since the last one, and resends after a
/// reconnect.
#[derive(Debug, Default)]
pub struct ControlArbiter {
    user_is_controlling: bool,
    last_recording: bool,
    last_exfiltrate: bool,
    last_control: Option<Command>,
}

impl ControlArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_is_controlling(&self) -> bool {
        self.user_is_controlling
    }

    /// Record the user's take/cede intent. Takes effect on the next
    /// [`evaluate`].
    ///
    /// [`evaluate`]: ControlArbiter::evaluate
    pub fn set_user_controlling(&mut self, value: bool) {
        self.user_is_controlling = value;
    }

    /// The control socket was lost. Whatever command was last sent died with
    /// it, so the next evaluation on a live socket resends the current state.
    pub fn note_disconnected(&mut self) {
        self.last_control = None;
    }

    pub fn evaluate(&mut self, input: EvalInput) -> Vec<Command> {
        let mut commands = Vec::new();

        if !input.connected {
            // Whatever we sent is gone with the socket; resend after redial.
            self.last_control = None;
        }

        // A non-interactive session can never be user-controlled.
        if !input.interactive {
            self.user_is_controlling = false;
        }

        let recording_rising = input.recording && !self.last_recording;
        self.last_recording = input.recording;

        if input.connected {
            if recording_rising {
                self.user_is_controlling = true;
            }
            let desired = if input.interactive || self.user_is_controlling {
                Command::TakeControl
            } else {
                Command::CedeControl
            };
            if recording_rising || self.last_control != Some(desired) {
                commands.push(desired);
                self.last_control = Some(desired);
            }
        }

        if input.exfiltrate != self.last_exfiltrate {
            commands.push(if input.exfiltrate {
                Command::BeginExfiltration
            } else {
                Command::EndExfiltration
            });
            self.last_exfiltrate = input.exfiltrate;
        }

        commands
    }
}
