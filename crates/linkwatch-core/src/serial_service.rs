use crate::error::{LinkError, Result};
use crate::event::{Edge, LinkEvent};
use crate::link::{ControlPin, Level, SerialLink};
use crossbeam_channel::{unbounded, Receiver, Sender};
use linkwatch_decode::BaudRate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    Usb { vid: u16, pid: u16, product: Option<String> },
    Pci,
    Bluetooth,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port_name: String,
    pub kind: PortKind,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let kind = match info.port_type {
            SerialPortType::UsbPort(usb) => PortKind::Usb {
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product,
            },
            SerialPortType::PciPort => PortKind::Pci,
            SerialPortType::BluetoothPort => PortKind::Bluetooth,
            SerialPortType::Unknown => PortKind::Unknown,
        };
        Self {
            port_name: info.port_name,
            kind,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PortKind::Usb { vid, pid, product } => {
                write!(f, "{} ({vid:04X}:{pid:04X})", self.port_name)?;
                if let Some(product) = product {
                    write!(f, " {product}")?;
                }
                Ok(())
            }
            PortKind::Pci => write!(f, "{} (PCI)", self.port_name),
            PortKind::Bluetooth => write!(f, "{} (Bluetooth)", self.port_name),
            PortKind::Unknown => f.write_str(&self.port_name),
        }
    }
}

/// Output line driven low to hold the remote transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlLine {
    /// TX itself, held in the break state.
    #[default]
    Break,
    Rts,
    Dtr,
}

impl std::str::FromStr for ControlLine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "break" | "tx" => Ok(Self::Break),
            "rts" => Ok(Self::Rts),
            "dtr" => Ok(Self::Dtr),
            other => Err(format!("unknown control line '{other}' (expected break, rts or dtr)")),
        }
    }
}

/// Modem-status input sampled for activity pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseLine {
    #[default]
    Cts,
    Dsr,
    Dcd,
    Ri,
    Off,
}

impl std::str::FromStr for PulseLine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cts" => Ok(Self::Cts),
            "dsr" => Ok(Self::Dsr),
            "dcd" => Ok(Self::Dcd),
            "ri" => Ok(Self::Ri),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("unknown pulse line '{other}' (expected cts, dsr, dcd, ri or off)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: BaudRate,
    pub control_line: ControlLine,
    pub pulse_line: PulseLine,
    /// Report a chunk that is exactly one NUL byte as a break.
    pub nul_as_break: bool,
    /// Read timeout and modem-status sampling period.
    pub poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: BaudRate::B2400,
            control_line: ControlLine::Break,
            pulse_line: PulseLine::Cts,
            nul_as_break: true,
            poll_interval_ms: 5,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(LinkError::invalid_config("poll_interval_ms must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Data,
    Break,
}

/// POSIX raw mode delivers a break as a lone NUL byte.
fn classify_chunk(chunk: &[u8], nul_as_break: bool) -> Chunk {
    if nul_as_break && chunk == [0x00] {
        Chunk::Break
    } else {
        Chunk::Data
    }
}

/// Turns level samples into edges. The first sample only primes it.
#[derive(Debug, Default)]
struct EdgeDetector {
    last: Option<bool>,
}

impl EdgeDetector {
    fn sample(&mut self, high: bool) -> Option<Edge> {
        let edge = match self.last {
            Some(false) if high => Some(Edge::Rising),
            Some(true) if !high => Some(Edge::Falling),
            _ => None,
        };
        self.last = Some(high);
        edge
    }
}

enum Command {
    Send(Vec<u8>),
    SetEnabled(bool),
    SetControl(Level),
    Close,
}

pub struct SerialService {
    cfg: SerialConfig,
    tx_cmd: Sender<Command>,
    rx_evt: Receiver<LinkEvent>,
    rx_buffer: Arc<Mutex<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
}

impl SerialService {
    pub fn list_ports() -> Result<Vec<PortInfo>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(PortInfo::from)
            .collect())
    }

    /// Opens the port 8N1 at the configured baud and starts the service thread.
    pub fn open(cfg: SerialConfig) -> Result<Self> {
        cfg.validate()?;
        if cfg.port_name.is_empty() {
            return Err(LinkError::invalid_config("no serial port given"));
        }
        let poll = Duration::from_millis(cfg.poll_interval_ms);
        let port = serialport::new(&cfg.port_name, cfg.baud_rate.as_u32())
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(poll)
            .open()?;
        log::info!("opened {} at {} baud", cfg.port_name, cfg.baud_rate);

        let (tx_cmd, rx_cmd) = unbounded::<Command>();
        let (tx_evt, rx_evt) = unbounded::<LinkEvent>();
        let rx_buffer = Arc::new(Mutex::new(Vec::new()));

        let worker = Worker {
            port,
            cfg: cfg.clone(),
            rx_cmd,
            tx_evt,
            rx_buffer: Arc::clone(&rx_buffer),
            enabled: true,
            pulse: EdgeDetector::default(),
        };
        let worker = std::thread::Builder::new()
            .name(format!("serial:{}", cfg.port_name))
            .spawn(move || worker.run())?;

        Ok(Self {
            cfg,
            tx_cmd,
            rx_evt,
            rx_buffer,
            worker: Some(worker),
        })
    }

    pub fn link(&self) -> SerialHandle {
        SerialHandle {
            tx_cmd: self.tx_cmd.clone(),
            rx_buffer: Arc::clone(&self.rx_buffer),
        }
    }

    pub fn control(&self) -> ControlHandle {
        ControlHandle {
            tx_cmd: self.tx_cmd.clone(),
        }
    }

    pub fn events(&self) -> &Receiver<LinkEvent> {
        &self.rx_evt
    }

    pub fn config(&self) -> &SerialConfig {
        &self.cfg
    }

    pub fn close(&self) {
        if self.tx_cmd.send(Command::Close).is_err() {
            log::debug!("serial service already stopped");
        }
    }
}

impl Drop for SerialService {
    fn drop(&mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("serial service thread panicked");
            }
        }
    }
}

/// [`SerialLink`] half of an open [`SerialService`].
#[derive(Clone)]
pub struct SerialHandle {
    tx_cmd: Sender<Command>,
    rx_buffer: Arc<Mutex<Vec<u8>>>,
}

impl SerialLink for SerialHandle {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.tx_cmd
            .send(Command::SetEnabled(enabled))
            .map_err(|_| LinkError::Disconnected)
    }

    fn read_pending(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut *self.rx_buffer.lock()))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx_cmd
            .send(Command::Send(bytes.to_vec()))
            .map_err(|_| LinkError::Disconnected)
    }
}

/// [`ControlPin`] half of an open [`SerialService`].
#[derive(Clone)]
pub struct ControlHandle {
    tx_cmd: Sender<Command>,
}

impl ControlPin for ControlHandle {
    fn set_level(&mut self, level: Level) -> Result<()> {
        self.tx_cmd
            .send(Command::SetControl(level))
            .map_err(|_| LinkError::Disconnected)
    }
}

struct Worker {
    port: Box<dyn SerialPort>,
    cfg: SerialConfig,
    rx_cmd: Receiver<Command>,
    tx_evt: Sender<LinkEvent>,
    rx_buffer: Arc<Mutex<Vec<u8>>>,
    enabled: bool,
    pulse: EdgeDetector,
}

impl Worker {
    fn run(mut self) {
        let poll = Duration::from_millis(self.cfg.poll_interval_ms);
        let mut buf = [0u8; 4096];
        loop {
            if self.enabled {
                match self.port.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        if !self.on_rx(&buf[..n]) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => {
                        log::error!("read from {} failed: {e}", self.cfg.port_name);
                        break;
                    }
                }
            } else {
                std::thread::sleep(poll);
            }

            if !self.poll_pulse() {
                break;
            }

            let mut closing = false;
            while let Ok(cmd) = self.rx_cmd.try_recv() {
                if !self.apply(cmd) {
                    closing = true;
                    break;
                }
            }
            if closing {
                break;
            }
        }
        if let Err(e) = self.drive_control(Level::High) {
            log::debug!("failed to release {:?} on shutdown: {e}", self.cfg.control_line);
        }
        log::info!("serial service for {} stopped", self.cfg.port_name);
    }

    fn emit(&self, event: LinkEvent) -> bool {
        self.tx_evt.send(event).is_ok()
    }

    fn on_rx(&mut self, chunk: &[u8]) -> bool {
        match classify_chunk(chunk, self.cfg.nul_as_break) {
            Chunk::Break => self.emit(LinkEvent::BreakDetected),
            Chunk::Data => {
                self.rx_buffer.lock().extend_from_slice(chunk);
                self.emit(LinkEvent::DataReceived)
            }
        }
    }

    fn read_pulse_line(&mut self) -> Option<serialport::Result<bool>> {
        Some(match self.cfg.pulse_line {
            PulseLine::Cts => self.port.read_clear_to_send(),
            PulseLine::Dsr => self.port.read_data_set_ready(),
            PulseLine::Dcd => self.port.read_carrier_detect(),
            PulseLine::Ri => self.port.read_ring_indicator(),
            PulseLine::Off => return None,
        })
    }

    fn poll_pulse(&mut self) -> bool {
        match self.read_pulse_line() {
            Some(Ok(high)) => match self.pulse.sample(high) {
                Some(edge) => self.emit(LinkEvent::Pulse(edge)),
                None => true,
            },
            Some(Err(e)) => {
                log::trace!("pulse line read failed: {e}");
                true
            }
            None => true,
        }
    }

    fn apply(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Send(data) => {
                if !self.enabled {
                    log::trace!("dropped {} byte write while disabled", data.len());
                } else if let Err(e) = self.port.write_all(&data) {
                    log::warn!("write to {} failed: {e}", self.cfg.port_name);
                }
            }
            Command::SetEnabled(enabled) => {
                if enabled && !self.enabled {
                    if let Err(e) = self.port.clear(ClearBuffer::Input) {
                        log::warn!("failed to clear input on re-enable: {e}");
                    }
                    self.rx_buffer.lock().clear();
                }
                self.enabled = enabled;
                log::debug!("{} enabled={enabled}", self.cfg.port_name);
            }
            Command::SetControl(level) => {
                if let Err(e) = self.drive_control(level) {
                    log::warn!("failed to drive {:?} {level:?}: {e}", self.cfg.control_line);
                }
            }
            Command::Close => return false,
        }
        true
    }

    fn drive_control(&mut self, level: Level) -> serialport::Result<()> {
        let high = level == Level::High;
        match self.cfg.control_line {
            ControlLine::Break if high => self.port.clear_break(),
            ControlLine::Break => self.port.set_break(),
            ControlLine::Rts => self.port.write_request_to_send(high),
            ControlLine::Dtr => self.port.write_data_terminal_ready(high),
        }
    }
}
