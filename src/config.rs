//! Load-time parameters.
//!
//! Parameters arrive once, as a kernel-style command line of `name=value`
//! tokens, and are immutable afterwards:
//!
//! | Name         | Type           | Default    | Meaning                                 |
//! |--------------|----------------|------------|-----------------------------------------|
//! | `speed`      | integer        | 5          | seconds between periodic toggles        |
//! | `ioEdge`     | integer        | 5          | diagnostic comparison value             |
//! | `myintArray` | up to 2 ints   | `-1,-1`    | line ids of the two blink outputs       |
//! | `variant`    | `blink`/`buttons` | `blink` | whether the button demo is wired up     |
//! | `demoLed`    | integer        | 4          | line id of the edge-driven demo output  |
//! | `buttons`    | up to 2 ints   | `17,19`    | line ids of the two button inputs       |
//!
//! Line ids are not checked here. An id the platform does not know is
//! reported when it is acquired.

use embassy_time::Duration;

use crate::error::ConfigError;
use crate::platform::LineId;

/// Which demo the controller runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// Two blinking outputs; the event counter counts timer firings.
    #[default]
    Blink,
    /// Blinking outputs plus a demo LED driven by two buttons; the event
    /// counter counts input-0 edges.
    Buttons,
}

/// Parameter names, as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Param {
    Speed,
    IoEdge,
    MyIntArray,
    Variant,
    DemoLed,
    Buttons,
}

impl Param {
    pub const fn name(self) -> &'static str {
        match self {
            Param::Speed => "speed",
            Param::IoEdge => "ioEdge",
            Param::MyIntArray => "myintArray",
            Param::Variant => "variant",
            Param::DemoLed => "demoLed",
            Param::Buttons => "buttons",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            Param::Speed,
            Param::IoEdge,
            Param::MyIntArray,
            Param::Variant,
            Param::DemoLed,
            Param::Buttons,
        ]
        .into_iter()
        .find(|p| p.name() == name)
    }
}

/// Validated configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    period_secs: u32,
    edge_selector: i32,
    line_ids: [LineId; 2],
    line_count: usize,
    variant: Variant,
    demo_led: LineId,
    buttons: [LineId; 2],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_secs: 5,
            edge_selector: 5,
            line_ids: [LineId::UNSET; 2],
            line_count: 0,
            variant: Variant::Blink,
            demo_led: LineId(4),
            buttons: [LineId(17), LineId(19)],
        }
    }
}

impl Config {
    /// Parses a whitespace-separated list of `name=value` tokens on top of
    /// the defaults.
    ///
    /// Unknown parameters are logged and ignored. Integers accept an
    /// optional sign and a `0x` (hex) or leading `0` (octal) prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a known parameter without a value, a
    /// malformed integer, an array with more than two values, a non-positive
    /// `speed`, or an unknown `variant`.
    pub fn parse(args: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for token in args.split_ascii_whitespace() {
            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (token, None),
            };

            let Some(param) = Param::from_name(name) else {
                warn!("unknown parameter '{}' ignored", name);
                continue;
            };
            let value = value.ok_or(ConfigError::MissingValue(param))?;

            match param {
                Param::Speed => {
                    let speed = parse_int(param, value)?;
                    config.period_secs =
                        u32::try_from(speed).ok().filter(|&s| s > 0).ok_or(ConfigError::NonPositivePeriod(speed))?;
                }
                Param::IoEdge => config.edge_selector = parse_int(param, value)?,
                Param::MyIntArray => {
                    config.line_count = parse_pair(param, value, &mut config.line_ids)?;
                }
                Param::Variant => {
                    config.variant = match value {
                        "blink" => Variant::Blink,
                        "buttons" => Variant::Buttons,
                        _ => return Err(ConfigError::UnknownVariant),
                    };
                }
                Param::DemoLed => config.demo_led = LineId(parse_int(param, value)?),
                Param::Buttons => {
                    parse_pair(param, value, &mut config.buttons)?;
                }
            }
        }

        Ok(config)
    }

    /// Sets the blink output line ids, as if `myintArray` had been given.
    pub fn with_lines(mut self, ids: [i32; 2]) -> Self {
        self.line_ids = ids.map(LineId);
        self.line_count = 2;
        self
    }

    /// Sets the blink period in seconds. Zero is raised to one.
    pub fn with_period_secs(mut self, secs: u32) -> Self {
        self.period_secs = secs.max(1);
        self
    }

    /// Sets the line id whose edges log the running count (`ioEdge`).
    ///
    /// # Arguments
    ///
    /// * `edge_selector` - Line id to compare against input 0; any value that
    ///   names no input silences the log
    pub fn with_edge_selector(mut self, edge_selector: i32) -> Self {
        self.edge_selector = edge_selector;
        self
    }

    /// Selects the button variant with the given demo LED and button lines.
    pub fn with_buttons(mut self, demo_led: i32, buttons: [i32; 2]) -> Self {
        self.variant = Variant::Buttons;
        self.demo_led = LineId(demo_led);
        self.buttons = buttons.map(LineId);
        self
    }

    /// Interval between blink firings.
    ///
    /// # Returns
    ///
    /// `speed` seconds as a [`Duration`], never zero.
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_secs))
    }

    /// Blink period in whole seconds (`speed`).
    pub fn period_secs(&self) -> u32 {
        self.period_secs
    }

    /// Line id whose input-0 edges log the count (`ioEdge`, default 5).
    pub fn edge_selector(&self) -> i32 {
        self.edge_selector
    }

    /// The two blink output lines (`myintArray`).
    ///
    /// # Returns
    ///
    /// Both slots, including ones the caller never set; those hold
    /// [`LineId::UNSET`]. See [`line_count`](Config::line_count).
    pub fn line_ids(&self) -> [LineId; 2] {
        self.line_ids
    }

    /// Number of `myintArray` values the caller actually supplied.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Which lines [`Controller::start`](crate::Controller::start) acquires.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Output toggled by input 0 in [`Variant::Buttons`].
    pub fn demo_led(&self) -> LineId {
        self.demo_led
    }

    /// Input lines for [`Variant::Buttons`].
    ///
    /// # Returns
    ///
    /// `[input 0, input 1]`: the first toggles the demo LED, the second
    /// clears it.
    pub fn buttons(&self) -> [LineId; 2] {
        self.buttons
    }

    /// Emits one diagnostic line per parameter.
    pub fn log(&self) {
        info!("speed is an integer: {}", self.period_secs);
        info!("ioEdge is: {}", self.edge_selector);
        for (i, id) in self.line_ids.iter().enumerate() {
            info!("myintArray[{}] = {}", i, id.0);
        }
        info!("got {} arguments for myintArray.", self.line_count);
        if self.variant == Variant::Buttons {
            info!(
                "demoLed is: {}, buttons are: {} {}",
                self.demo_led.0, self.buttons[0].0, self.buttons[1].0
            );
        }
    }
}

/// Parses a comma-separated list of at most two integers into `slots`,
/// returning how many were given. Slots without a value keep their previous
/// contents.
fn parse_pair(param: Param, value: &str, slots: &mut [LineId; 2]) -> Result<usize, ConfigError> {
    let mut count = 0;
    for item in value.split(',') {
        let slot = slots
            .get_mut(count)
            .ok_or(ConfigError::TooManyValues { param, max: 2 })?;
        *slot = LineId(parse_int(param, item)?);
        count += 1;
    }
    Ok(count)
}

fn parse_int(param: Param, text: &str) -> Result<i32, ConfigError> {
    let invalid = ConfigError::InvalidInteger(param);

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    // from_str_radix would accept a second sign
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid);
    }

    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| invalid)?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).map_err(|_| invalid)
}
