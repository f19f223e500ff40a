// Pattern effect column. A step's 16-bit command is `EEPP`: effect in the high
// byte, parameter in the low byte.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Arpeggio { x: u8, y: u8 },
    PortaUp(u8),
    PortaDown(u8),
    Vibrato { speed: u8, depth: u8 },
    VolumeFade { up: u8, down: u8 },
    SetVolume(u8),
    SetSpeed(u8),
}

pub const FX_ARPEGGIO: u8 = 0x00;
pub const FX_PORTA_UP: u8 = 0x01;
pub const FX_PORTA_DN: u8 = 0x02;
pub const FX_VIBRATO: u8 = 0x04;
pub const FX_FADE_VOLUME: u8 = 0x0a;
pub const FX_SET_VOLUME: u8 = 0x0c;
pub const FX_SET_SPEED: u8 = 0x0f;

impl Effect {
    /// Zero and unknown commands decode to `None`.
    pub fn decode(command: u16) -> Option<Self> {
        let [fx, param] = command.to_be_bytes();
        let (hi, lo) = (param >> 4, param & 0xf);

        match fx {
            FX_ARPEGGIO if param != 0 => Some(Effect::Arpeggio { x: hi, y: lo }),
            FX_PORTA_UP => Some(Effect::PortaUp(param)),
            FX_PORTA_DN => Some(Effect::PortaDown(param)),
            FX_VIBRATO => Some(Effect::Vibrato { speed: hi, depth: lo }),
            FX_FADE_VOLUME => Some(Effect::VolumeFade { up: hi, down: lo }),
            FX_SET_VOLUME => Some(Effect::SetVolume(param)),
            FX_SET_SPEED if param != 0 => Some(Effect::SetSpeed(param)),
            _ => None,
        }
    }

    pub fn encode(&self) -> u16 {
        let nibbles = |a: u8, b: u8| (a.min(15) << 4) | b.min(15);
        let (fx, param) = match *self {
            Effect::Arpeggio { x, y } => (FX_ARPEGGIO, nibbles(x, y)),
            Effect::PortaUp(p) => (FX_PORTA_UP, p),
            Effect::PortaDown(p) => (FX_PORTA_DN, p),
            Effect::Vibrato { speed, depth } => (FX_VIBRATO, nibbles(speed, depth)),
            Effect::VolumeFade { up, down } => (FX_FADE_VOLUME, nibbles(up, down)),
            Effect::SetVolume(v) => (FX_SET_VOLUME, v),
            Effect::SetSpeed(s) => (FX_SET_SPEED, s),
        };
        u16::from_be_bytes([fx, param])
    }
}
