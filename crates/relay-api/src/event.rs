use serde_json::Value;

/// Internal event set the controller consumes. Everything the host can throw
/// at us is normalized into one of these or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ClientOpened,
    ClientClosed,
    PrintStarted,
    PrintDone,
    Disconnected,
    /// External request/notification to power the device on.
    PowerOn,
    /// External request/notification to power the device off.
    PowerOff,
    /// Outgoing printer command trace; `gcode` is the bare command name
    /// (e.g. "M105") when the communication layer could extract one.
    CommandSent { gcode: Option<String> },
}

/// Translate a host notification into an internal event. Unrecognized names
/// yield `None` and are ignored by the dispatcher.
///
/// Matching on an enumerated name set keeps membership checks unambiguous;
/// there is no container of mixed scalars to get wrong.
pub fn normalize(name: &str, payload: &Value) -> Option<Event> {
    match name {
        "ClientOpened" => Some(Event::ClientOpened),
        "ClientClosed" => Some(Event::ClientClosed),
        "PrintStarted" => Some(Event::PrintStarted),
        "PrintDone" => Some(Event::PrintDone),
        "Disconnected" => Some(Event::Disconnected),
        "PowerOn" => Some(Event::PowerOn),
        "PowerOff" => Some(Event::PowerOff),
        "CommandSent" => {
            let gcode = payload
                .get("gcode")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Event::CommandSent { gcode })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_names_normalize() {
        assert_eq!(normalize("ClientOpened", &Value::Null), Some(Event::ClientOpened));
        assert_eq!(normalize("PrintDone", &Value::Null), Some(Event::PrintDone));
        assert_eq!(normalize("PowerOff", &Value::Null), Some(Event::PowerOff));
    }

    #[test]
    fn unknown_names_are_dropped() {
        assert_eq!(normalize("FileAdded", &Value::Null), None);
        assert_eq!(normalize("", &Value::Null), None);
    }

    #[test]
    fn command_sent_extracts_gcode() {
        let ev = normalize("CommandSent", &json!({"gcode": "M105", "line": "M105"}));
        assert_eq!(ev, Some(Event::CommandSent { gcode: Some("M105".into()) }));

        let ev = normalize("CommandSent", &json!({"line": "T0"}));
        assert_eq!(ev, Some(Event::CommandSent { gcode: None }));
    }
}
