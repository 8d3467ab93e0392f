use std::fmt;

/// One recognized BCL statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// 1-based line in the source document.
    pub line: usize,
    /// The source line, as written.
    pub text: String,
    pub kind: CommandKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Block(Block),
    Statement(Statement),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Block(block) => block.fmt(f),
            CommandKind::Statement(statement) => statement.fmt(f),
        }
    }
}

/// The block a statement appears in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    TopLevel,
    Preset,
    Global,
    General,
    Encoder,
    Button,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Context::*;
        f.write_str(match self {
            TopLevel => "outside of a block",
            Preset => "in $preset",
            Global => "in $global",
            General => "in $general",
            Encoder => "in $encoder",
            Button => "in $button",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Rev(String),
    Preset,
    Global,
    General,
    Encoder(u8),
    Button(u8),
    Store(u8),
    Recall(u8),
    End,
}

impl Block {
    pub const ENCODERS: std::ops::RangeInclusive<u32> = 1..=56;
    pub const BUTTONS: std::ops::RangeInclusive<u32> = 1..=64;
    pub const PRESETS: std::ops::RangeInclusive<u32> = 1..=32;
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Block::*;
        match self {
            Rev(rev) => write!(f, "$rev {rev}"),
            Preset => f.write_str("$preset"),
            Global => f.write_str("$global"),
            General => f.write_str("$general"),
            Encoder(idx) => write!(f, "$encoder {idx}"),
            Button(idx) => write!(f, "$button {idx}"),
            Store(preset) => write!(f, "$store {preset}"),
            Recall(preset) => write!(f, "$recall {preset}"),
            End => f.write_str("$end"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Name(String),
    Snapshot(bool),
    Request(bool),
    EGroups(u8),
    FKeys(bool),
    Lock(bool),
    Init,
    EasyPar(EasyPar),
    ShowValue(bool),
    Mode(Mode),
    Default(u16),
    MinMax { min: u16, max: u16 },
    Resolution(Vec<u16>),
    Tx(Vec<TxItem>),
    MidiMode(MidiMode),
    Startup(Startup),
    RxCh(Option<u8>),
    DeviceId(u8),
}

impl Statement {
    pub const NAME_MAX_LEN: usize = 24;

    /// Contexts in which a statement keyword is accepted.
    pub fn allowed_in(keyword: &str) -> Option<&'static [Context]> {
        use Context::*;
        let contexts: &'static [Context] = match keyword {
            "name" | "snapshot" | "request" | "egroups" | "fkeys" | "lock" => &[Preset],
            "init" => &[Preset, Encoder, Button],
            "easypar" | "showvalue" | "mode" | "minmax" | "tx" => &[Encoder, Button],
            "default" | "resolution" => &[Encoder],
            "midimode" | "startup" | "rxch" | "deviceid" => &[Global],
            _ => return None,
        };

        Some(contexts)
    }
}

fn on_off(val: bool) -> &'static str {
    if val {
        "on"
    } else {
        "off"
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Statement::*;
        match self {
            Name(name) => write!(f, ".name '{name}'"),
            Snapshot(val) => write!(f, ".snapshot {}", on_off(*val)),
            Request(val) => write!(f, ".request {}", on_off(*val)),
            EGroups(count) => write!(f, ".egroups {count}"),
            FKeys(val) => write!(f, ".fkeys {}", on_off(*val)),
            Lock(val) => write!(f, ".lock {}", on_off(*val)),
            Init => f.write_str(".init"),
            EasyPar(par) => write!(f, ".easypar {par}"),
            ShowValue(val) => write!(f, ".showvalue {}", on_off(*val)),
            Mode(mode) => write!(f, ".mode {mode}"),
            Default(val) => write!(f, ".default {val}"),
            MinMax { min, max } => write!(f, ".minmax {min} {max}"),
            Resolution(list) => {
                f.write_str(".resolution")?;
                for val in list {
                    write!(f, " {val}")?;
                }
                Ok(())
            }
            Tx(items) => {
                f.write_str(".tx")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                Ok(())
            }
            MidiMode(mode) => write!(f, ".midimode {mode}"),
            Startup(startup) => write!(f, ".startup {startup}"),
            RxCh(Some(chan)) => write!(f, ".rxch {chan}"),
            RxCh(None) => f.write_str(".rxch off"),
            DeviceId(id) => write!(f, ".deviceid {id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EasyPar {
    Cc {
        channel: u8,
        number: u8,
        min: u16,
        max: u16,
        mode: ParMode,
    },
    Nrpn {
        channel: u8,
        number: u16,
        min: u16,
        max: u16,
        mode: ParMode,
    },
    Pc {
        channel: u8,
        program: u8,
    },
    Note {
        channel: u8,
        note: u8,
        velocity: u8,
        mode: ParMode,
    },
}

impl fmt::Display for EasyPar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EasyPar::*;
        match self {
            Cc {
                channel,
                number,
                min,
                max,
                mode,
            } => write!(f, "CC {channel} {number} {min} {max} {mode}"),
            Nrpn {
                channel,
                number,
                min,
                max,
                mode,
            } => write!(f, "NRPN {channel} {number} {min} {max} {mode}"),
            Pc { channel, program } => write!(f, "PC {channel} {program}"),
            Note {
                channel,
                note,
                velocity,
                mode,
            } => write!(f, "NOTE {channel} {note} {velocity} {mode}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParMode {
    Absolute,
    Absolute14,
    /// Relative mode 1 to 3.
    Relative(u8),
    ToggleOn,
    ToggleOff,
    Increment(u16),
}

impl ParMode {
    pub fn from_word(word: &str) -> Option<Self> {
        use ParMode::*;
        Some(match word.to_ascii_lowercase().as_str() {
            "absolute" => Absolute,
            "absolute/14" => Absolute14,
            "relative-1" => Relative(1),
            "relative-2" => Relative(2),
            "relative-3" => Relative(3),
            "toggleon" => ToggleOn,
            "toggleoff" => ToggleOff,
            // step is expected as the next operand
            "increment" => Increment(0),
            _ => return None,
        })
    }

    pub fn is_allowed_in(&self, context: Context) -> bool {
        use ParMode::*;
        match self {
            Absolute | Absolute14 | Relative(_) => context == Context::Encoder,
            ToggleOn | ToggleOff | Increment(_) => context == Context::Button,
        }
    }

    pub fn max_value(&self) -> u16 {
        match self {
            ParMode::Absolute14 => crate::midi::u14::MAX,
            _ => 127,
        }
    }
}

impl fmt::Display for ParMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ParMode::*;
        match self {
            Absolute => f.write_str("absolute"),
            Absolute14 => f.write_str("absolute/14"),
            Relative(idx) => write!(f, "relative-{idx}"),
            ToggleOn => f.write_str("toggleon"),
            ToggleOff => f.write_str("toggleoff"),
            Increment(step) => write!(f, "increment {step}"),
        }
    }
}

/// `.mode`: LED ring mode for encoders, behaviour for buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Off,
    OneDot,
    OneDotOff,
    TwelveDots,
    TwelveDotsOff,
    Bar,
    BarOff,
    Spread,
    Pan,
    Qual,
    Cut,
    Damp,
    Down,
    Toggle,
}

impl Mode {
    const ENCODER: [(&'static str, Mode); 12] = [
        ("off", Mode::Off),
        ("1dot", Mode::OneDot),
        ("1dot/off", Mode::OneDotOff),
        ("12dot", Mode::TwelveDots),
        ("12dot/off", Mode::TwelveDotsOff),
        ("bar", Mode::Bar),
        ("bar/off", Mode::BarOff),
        ("spread", Mode::Spread),
        ("pan", Mode::Pan),
        ("qual", Mode::Qual),
        ("cut", Mode::Cut),
        ("damp", Mode::Damp),
    ];
    const BUTTON: [(&'static str, Mode); 2] = [("down", Mode::Down), ("toggle", Mode::Toggle)];

    pub fn from_word(word: &str, context: Context) -> Option<Self> {
        let table: &[(&str, Mode)] = match context {
            Context::Encoder => &Self::ENCODER,
            Context::Button => &Self::BUTTON,
            _ => return None,
        };

        table
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, mode)| *mode)
    }

    pub fn as_str(&self) -> &'static str {
        Self::ENCODER
            .iter()
            .chain(Self::BUTTON.iter())
            .find(|(_, mode)| mode == self)
            .map_or("off", |(name, _)| *name)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxItem {
    Byte(u8),
    /// `val`, `val0.6`, `val7.13`...
    Value(String),
    /// `cks-1`, `cks-2`...
    Checksum(String),
}

impl fmt::Display for TxItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxItem::Byte(byte) => write!(f, "${byte:02X}"),
            TxItem::Value(word) | TxItem::Checksum(word) => f.write_str(word),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMode {
    /// USB modes U-1 to U-4.
    Usb(u8),
    /// Standalone modes S-1 to S-4.
    Standalone(u8),
}

impl MidiMode {
    pub fn from_word(word: &str) -> Option<Self> {
        let (kind, idx) = word.split_once('-')?;
        let idx: u8 = idx.parse().ok().filter(|idx| (1..=4).contains(idx))?;

        match kind {
            "U" | "u" => Some(MidiMode::Usb(idx)),
            "S" | "s" => Some(MidiMode::Standalone(idx)),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMode::Usb(idx) => write!(f, "U-{idx}"),
            MidiMode::Standalone(idx) => write!(f, "S-{idx}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Startup {
    Last,
    Preset(u8),
}

impl fmt::Display for Startup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Startup::Last => f.write_str("last"),
            Startup::Preset(preset) => write!(f, "{preset}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_canonical() {
        let par = Statement::EasyPar(EasyPar::Cc {
            channel: 1,
            number: 7,
            min: 0,
            max: 127,
            mode: ParMode::Absolute,
        });
        assert_eq!(par.to_string(), ".easypar CC 1 7 0 127 absolute");

        let tx = Statement::Tx(vec![
            TxItem::Byte(0xb0),
            TxItem::Byte(0x07),
            TxItem::Value("val".into()),
        ]);
        assert_eq!(tx.to_string(), ".tx $B0 $07 val");

        assert_eq!(Block::Encoder(3).to_string(), "$encoder 3");
        assert_eq!(Statement::RxCh(None).to_string(), ".rxch off");
    }

    #[test]
    fn modes_depend_on_context() {
        assert_eq!(Mode::from_word("12DOT/off", Context::Encoder), Some(Mode::TwelveDotsOff));
        assert_eq!(Mode::from_word("toggle", Context::Encoder), None);
        assert_eq!(Mode::from_word("toggle", Context::Button), Some(Mode::Toggle));
        assert_eq!(Mode::TwelveDotsOff.as_str(), "12dot/off");
    }

    #[test]
    fn midi_mode_words() {
        assert_eq!(MidiMode::from_word("U-2"), Some(MidiMode::Usb(2)));
        assert_eq!(MidiMode::from_word("s-4"), Some(MidiMode::Standalone(4)));
        assert_eq!(MidiMode::from_word("U-5"), None);
        assert_eq!(MidiMode::from_word("X-1"), None);
    }
}
