//! Everything the watchdog writes onto the supervised link.

use crate::clock::Millis;

pub const FRAME_OPEN: &[u8] = b">>";
pub const FRAME_CLOSE: &[u8] = b"<<\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Heartbeat(Millis),
    Echo(Vec<u8>),
    FramingError,
    Overrun,
    Break,
    BreakDone,
    PulseSeen,
    PulseMissed,
}

impl Message {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Heartbeat(elapsed) => format!("{elapsed}\n").into_bytes(),
            Self::Echo(data) => {
                let mut out = Vec::with_capacity(FRAME_OPEN.len() + data.len() + FRAME_CLOSE.len());
                out.extend_from_slice(FRAME_OPEN);
                out.extend_from_slice(data);
                out.extend_from_slice(FRAME_CLOSE);
                out
            }
            Self::FramingError => b"!!frame!!\n".to_vec(),
            Self::Overrun => b"!!overrun!!\n".to_vec(),
            Self::Break => b"!!break!!\n".to_vec(),
            Self::BreakDone => b"!!break done!!\n".to_vec(),
            Self::PulseSeen => b"!!RX hi!!\n".to_vec(),
            Self::PulseMissed => b"!!RX hi!! (pins.onPulsed() missed)\n".to_vec(),
        }
    }
}
