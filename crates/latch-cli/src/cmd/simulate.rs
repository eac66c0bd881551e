//! The full controller on in-memory devices, driven from stdin.

use std::sync::Arc;

use anyhow::{Context, Result};
use latch_controller::{Devices, OrchestratorHandle};
use latch_core::Settings;
use latch_hardware::mock::{
    MemoryLink, MemoryLinkHandle, MockDiscovery, MockSensor, MockSensorHandle, MockTerminal,
    MockTerminalHandle,
};
use latch_hardware::{
    DriverKind, DriverManager, FeedbackPlayer, LockActuator, LockConfig, ModemConfig,
    ModemController, TerminalConfig, TerminalLink,
};
use latch_storage::MemoryRoster;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::Controller;

const HELP: &str = "\
commands:
  o            open the door
  c            close the door
  r [number]   incoming call, hidden number when omitted
  h            call ended
  t <uid>      present a tag (hex)
  b            press and release the doorbell button
  l <0|1>      lights off/on
  ?            this help";

/// One line of simulator input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SimCommand {
    Door(bool),
    Ring(Option<String>),
    CallEnded,
    Tag(Vec<u8>),
    Button,
    Light(bool),
    Help,
}

fn parse_command(line: &str) -> Option<SimCommand> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        ("o", None) => SimCommand::Door(true),
        ("c", None) => SimCommand::Door(false),
        ("r", number) => SimCommand::Ring(number.map(str::to_string)),
        ("h", None) => SimCommand::CallEnded,
        ("t", Some(uid)) => SimCommand::Tag(parse_hex(uid)?),
        ("b", None) => SimCommand::Button,
        ("l", Some("1")) => SimCommand::Light(true),
        ("l", Some("0")) => SimCommand::Light(false),
        ("?", None) => SimCommand::Help,
        _ => return None,
    };
    words.next().is_none().then_some(command)
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() || text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Input side of the simulated devices.
struct SimulatedHardware {
    door: MockSensorHandle,
    modem: MemoryLinkHandle,
    terminal: MockTerminalHandle,
    controls: OrchestratorHandle,
}

impl SimulatedHardware {
    fn apply(&self, command: SimCommand) {
        match command {
            SimCommand::Door(open) => self.door.set_open(open),
            SimCommand::Ring(Some(number)) => {
                self.modem
                    .inject(format!("RING\r\n+CLIP:\"{number}\",129,,,,0\r\n").as_bytes());
            }
            SimCommand::Ring(None) => self.modem.inject(b"RING\r\n+CLIP:\"\",128,,,,1\r\n"),
            SimCommand::CallEnded => self.modem.inject(b"^CEND:1,0,104,16\r\n"),
            SimCommand::Tag(uid) => self.terminal.present_tag(&uid),
            SimCommand::Button => {
                self.terminal.set_button(true);
                self.terminal.set_button(false);
            }
            SimCommand::Light(on) => self.controls.light_on_change(on),
            SimCommand::Help => println!("{HELP}"),
        }
    }

    async fn read_commands(self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_command(&line) {
                    Some(command) => self.apply(command),
                    None => println!("unknown command {:?}, ? for help", line.trim()),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    }
}

/// Modem firmware that acknowledges every command line.
async fn answer_modem(line: MemoryLinkHandle) {
    loop {
        line.wait_written().await;
        let written = line.take_written();
        for _ in written.iter().filter(|&&b| b == b'\n') {
            line.inject(b"OK\r\n");
        }
    }
}

pub async fn run(settings: &Settings) -> Result<()> {
    let roster = MemoryRoster::open(&settings.roster.path).with_context(|| {
        format!("failed to load roster {}", settings.roster.path.display())
    })?;

    let mut manager = DriverManager::new();

    let (lock_link, lock_line) = MemoryLink::new("lock");
    lock_line.set_line_rate(Some(settings.door.baud_rate));
    let (sensor, door) = MockSensor::new();
    let (actuator, lock) = LockActuator::new(
        lock_link,
        sensor,
        LockConfig::from(&settings.door),
        manager.events(),
    );
    manager.register_lock(actuator);

    let (modem_link, modem_line) = MemoryLink::new("modem");
    let (controller, modem) = ModemController::new(
        modem_link,
        MockDiscovery::present(),
        ModemConfig::from(&settings.modem),
        manager.events(),
    );
    manager.register_modem(controller);
    manager.register(DriverKind::Simulator, answer_modem(modem_line.clone()));

    let (terminal_link, terminal_line) = MemoryLink::new("terminal");
    let (firmware, terminal) = MockTerminal::new(terminal_line);
    manager.register(DriverKind::Simulator, firmware.with_display_logging().run());
    let (link, terminal_handle) = TerminalLink::new(
        terminal_link,
        TerminalConfig::from(&settings.reader),
        manager.events(),
    );
    manager.register_terminal(link);

    let devices = Devices {
        lock,
        modem,
        feedback: FeedbackPlayer::new(Arc::new(terminal_handle)),
    };
    let controller = Controller::start(settings, manager, devices, roster);
    let hardware = SimulatedHardware {
        door,
        modem: modem_line,
        terminal,
        controls: controller.handle(),
    };

    println!("{HELP}");
    controller
        .run_until(async {
            tokio::select! {
                _ = hardware.read_commands() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await;
    Ok(())
}
