use std::fmt;

const CONTROLLER: &str = "Lighting_controller::";

/// A line received from the lighting controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DimmerSet {
        address: String,
        level: i32,
        fade_time: String,
    },
    Switch {
        address: String,
        on: bool,
    },
    Ping,
    Pong,
    Measurement {
        key: String,
        units: String,
        value: f32,
    },
}

/// A line sent to the lighting controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Pong,
    Configure { lighting_address: String },
    ConfigureDimmer { address: String },
    ConfigureSwitch { address: String },
    SwitchOn { address: String },
    SwitchOff { address: String },
    DimmerSet {
        address: String,
        level: u8,
        fade_time: u32,
    },
}

impl Command {
    pub fn switch(address: &str, on: bool) -> Self {
        let address = address.to_string();
        if on {
            Self::SwitchOn { address }
        } else {
            Self::SwitchOff { address }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "{CONTROLLER}Ping()"),
            Self::Pong => write!(f, "{CONTROLLER}Pong()"),
            Self::Configure { lighting_address } => {
                write!(f, "{CONTROLLER}Configure(Lighting_Address = {lighting_address})")
            }
            Self::ConfigureDimmer { address } => {
                write!(f, "{CONTROLLER}ConfigureDimmer(Address1 = {address})")
            }
            Self::ConfigureSwitch { address } => {
                write!(f, "{CONTROLLER}ConfigureSwitch(Address1 = {address})")
            }
            Self::SwitchOn { address } => write!(f, "{CONTROLLER}SwitchOn(Address1 = {address})"),
            Self::SwitchOff { address } => {
                write!(f, "{CONTROLLER}SwitchOff(Address1 = {address})")
            }
            Self::DimmerSet {
                address,
                level,
                fade_time,
            } => write!(
                f,
                "{CONTROLLER}DimmerSet(Address1 = {address}, DimmerLevel = {level}, FadeTime = {fade_time})"
            ),
        }
    }
}

/// Parses one protocol line. Lines that match no known form, or whose
/// numeric fields do not parse, yield `None`.
pub fn parse(line: &str) -> Option<Event> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(args) = call_args(line, "Lighting_controller::DimmerSet(") {
        return parse_dimmer_set(args);
    }
    if let Some(event) = parse_switch(line) {
        return Some(event);
    }
    if line.contains("Lighting_controller::Ping()") {
        return Some(Event::Ping);
    }
    if line.contains("Lighting_controller::Pong()") {
        return Some(Event::Pong);
    }
    if let Some(args) = call_args(line, "Measurement(") {
        return parse_measurement(args);
    }
    None
}

/// Returns the text between `open` and the last `)` that follows it.
fn call_args<'a>(line: &'a str, open: &str) -> Option<&'a str> {
    let start = line.find(open)? + open.len();
    let rest = &line[start..];
    let end = rest.rfind(')')?;
    Some(&rest[..end])
}

/// Splits `args` into the values of `names`, in order. Each separator is
/// taken at its last occurrence so earlier values may contain it.
fn fields<'a, const N: usize>(args: &'a str, names: [&str; N]) -> Option<[&'a str; N]> {
    let mut values = [""; N];
    let mut rest = args;
    for index in (1..N).rev() {
        let separator = format!(", {} = ", names[index]);
        let (head, value) = rest.rsplit_once(&separator)?;
        values[index] = value;
        rest = head;
    }
    values[0] = rest.strip_prefix(names[0])?.strip_prefix(" = ")?;
    Some(values)
}

fn parse_dimmer_set(args: &str) -> Option<Event> {
    let [address, level, fade_time] = fields(args, ["Address1", "DimmerLevel", "FadeTime"])?;
    Some(Event::DimmerSet {
        address: address.to_string(),
        level: level.trim().parse().ok()?,
        fade_time: fade_time.to_string(),
    })
}

fn parse_switch(line: &str) -> Option<Event> {
    let start = line.find("Lighting_controller::Switch")? + "Lighting_controller::Switch".len();
    let rest = &line[start..];
    let on = if rest.starts_with("On(") {
        true
    } else if rest.starts_with("Off(") {
        false
    } else {
        return None;
    };

    let args = call_args(rest, "(")?;
    let [address] = fields(args, ["Address1"])?;
    Some(Event::Switch {
        address: address.to_string(),
        on,
    })
}

fn parse_measurement(args: &str) -> Option<Event> {
    let [key, units, value] = fields(args, ["Device+Channel", "Units", "Value"])?;
    let value: f32 = value.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(Event::Measurement {
        key: key.to_string(),
        units: units.to_string(),
        value,
    })
}
