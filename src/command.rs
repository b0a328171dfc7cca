//! # AT Command Encoding
//!
//! This module defines the AT commands the client sends to an ESP-AT modem
//! and the argument validation applied before any of them is built. A
//! string that could break out of its quotes or terminate the line early is
//! refused here, so a malformed command never reaches the modem.

use core::fmt::Write;

use heapless::String;

use crate::config::LastWill;
use crate::error::ArgumentError;

/// Longest command line the client will build, terminator excluded.
pub const MAX_COMMAND_LEN: usize = 256;
/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;
/// Maximum SSID length accepted by the modem.
pub const MAX_SSID_LEN: usize = 32;
/// Maximum length for passwords, user names and client ids.
pub const MAX_CREDENTIAL_LEN: usize = 64;
/// Maximum broker host name length.
pub const MAX_HOST_LEN: usize = 128;
/// Maximum last will message length.
pub const MAX_WILL_MESSAGE_LEN: usize = 64;
/// Largest raw publish payload.
pub const MAX_PUBLISH_PAYLOAD: usize = 1024;

/// An encoded command line, without the CR LF terminator.
pub type CommandLine = String<MAX_COMMAND_LEN>;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Maps a numeric level to a `QoS`, rejecting anything above 2.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

/// The commands understood by the client. All MQTT commands use link id 0.
#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    /// `AT`
    Probe,
    /// `ATE0`
    EchoOff,
    /// `AT+CWMODE=1`
    StationMode,
    /// `AT+CWJAP="<ssid>","<password>"`
    JoinAccessPoint { ssid: &'a str, password: &'a str },
    /// `AT+CWQAP`
    QuitAccessPoint,
    /// `AT+CIPSTATUS`
    StationStatus,
    /// `AT+MQTTUSERCFG=0,1,"<client id>","<user>","<password>",0,0,""`
    MqttUserConfig {
        client_id: &'a str,
        username: &'a str,
        password: &'a str,
    },
    /// `AT+MQTTCONNCFG=0,<keepalive>,0,"<will topic>","<will message>",<qos>,<retain>`
    MqttConnConfig {
        keepalive_secs: u16,
        will: Option<LastWill<'a>>,
    },
    /// `AT+MQTTCONN=0,"<host>",<port>,0`
    MqttConnect { host: &'a str, port: u16 },
    /// `AT+MQTTSUB=0,"<topic>",<qos>`
    MqttSubscribe { topic: &'a str, qos: QoS },
    /// `AT+MQTTUNSUB=0,"<topic>"`
    MqttUnsubscribe { topic: &'a str },
    /// `AT+MQTTPUBRAW=0,"<topic>",<len>,<qos>,<retain>`
    MqttPublishRaw {
        topic: &'a str,
        len: usize,
        qos: QoS,
        retain: bool,
    },
    /// `AT+MQTTCONN?`
    MqttStatus,
    /// `AT+MQTTCLEAN=0`
    MqttClean,
}

impl Command<'_> {
    /// Validates the arguments and renders the command line.
    pub fn encode(&self) -> Result<CommandLine, ArgumentError> {
        let mut line = CommandLine::new();
        match *self {
            Command::Probe => emit(&mut line, format_args!("AT"))?,
            Command::EchoOff => emit(&mut line, format_args!("ATE0"))?,
            Command::StationMode => emit(&mut line, format_args!("AT+CWMODE=1"))?,
            Command::JoinAccessPoint { ssid, password } => {
                validate_text(ssid, MAX_SSID_LEN, false)?;
                validate_text(password, MAX_CREDENTIAL_LEN, true)?;
                emit(&mut line, format_args!("AT+CWJAP=\"{}\",\"{}\"", ssid, password))?;
            }
            Command::QuitAccessPoint => emit(&mut line, format_args!("AT+CWQAP"))?,
            Command::StationStatus => emit(&mut line, format_args!("AT+CIPSTATUS"))?,
            Command::MqttUserConfig {
                client_id,
                username,
                password,
            } => {
                validate_text(client_id, MAX_CREDENTIAL_LEN, false)?;
                validate_text(username, MAX_CREDENTIAL_LEN, true)?;
                validate_text(password, MAX_CREDENTIAL_LEN, true)?;
                emit(
                    &mut line,
                    format_args!(
                        "AT+MQTTUSERCFG=0,1,\"{}\",\"{}\",\"{}\",0,0,\"\"",
                        client_id, username, password
                    ),
                )?;
            }
            Command::MqttConnConfig {
                keepalive_secs,
                will,
            } => match will {
                Some(will) => {
                    validate_topic(will.topic, true)?;
                    validate_text(will.message, MAX_WILL_MESSAGE_LEN, false)?;
                    emit(
                        &mut line,
                        format_args!(
                            "AT+MQTTCONNCFG=0,{},0,\"{}\",\"{}\",{},{}",
                            keepalive_secs,
                            will.topic,
                            will.message,
                            will.qos.level(),
                            u8::from(will.retain)
                        ),
                    )?;
                }
                None => emit(
                    &mut line,
                    format_args!("AT+MQTTCONNCFG=0,{},0,\"\",\"\",0,0", keepalive_secs),
                )?,
            },
            Command::MqttConnect { host, port } => {
                validate_text(host, MAX_HOST_LEN, false)?;
                emit(&mut line, format_args!("AT+MQTTCONN=0,\"{}\",{},0", host, port))?;
            }
            Command::MqttSubscribe { topic, qos } => {
                validate_topic(topic, false)?;
                emit(
                    &mut line,
                    format_args!("AT+MQTTSUB=0,\"{}\",{}", topic, qos.level()),
                )?;
            }
            Command::MqttUnsubscribe { topic } => {
                validate_topic(topic, false)?;
                emit(&mut line, format_args!("AT+MQTTUNSUB=0,\"{}\"", topic))?;
            }
            Command::MqttPublishRaw {
                topic,
                len,
                qos,
                retain,
            } => {
                validate_topic(topic, true)?;
                if len == 0 {
                    return Err(ArgumentError::Empty);
                }
                if len > MAX_PUBLISH_PAYLOAD {
                    return Err(ArgumentError::PayloadTooLarge);
                }
                emit(
                    &mut line,
                    format_args!(
                        "AT+MQTTPUBRAW=0,\"{}\",{},{},{}",
                        topic,
                        len,
                        qos.level(),
                        u8::from(retain)
                    ),
                )?;
            }
            Command::MqttStatus => emit(&mut line, format_args!("AT+MQTTCONN?"))?,
            Command::MqttClean => emit(&mut line, format_args!("AT+MQTTCLEAN=0"))?,
        }
        Ok(line)
    }

    /// Commands that carry credentials are not logged verbatim.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Command::JoinAccessPoint { .. } | Command::MqttUserConfig { .. }
        )
    }
}

fn emit(line: &mut CommandLine, args: core::fmt::Arguments<'_>) -> Result<(), ArgumentError> {
    line.write_fmt(args).map_err(|_| ArgumentError::CommandTooLong)
}

/// Checks a string that will be placed between quotes in a command.
///
/// Quotes, backslashes and commas would need escaping on the modem side and
/// control characters would end the line, so all of them are refused.
pub fn validate_text(value: &str, max_len: usize, allow_empty: bool) -> Result<(), ArgumentError> {
    if value.is_empty() && !allow_empty {
        return Err(ArgumentError::Empty);
    }
    if value.len() > max_len {
        return Err(ArgumentError::TooLong);
    }
    if value
        .bytes()
        .any(|b| matches!(b, b'"' | b'\\' | b',') || b.is_ascii_control())
    {
        return Err(ArgumentError::DisallowedCharacter);
    }
    Ok(())
}

/// Checks a topic. Publish topics may not contain wildcards.
pub fn validate_topic(topic: &str, for_publish: bool) -> Result<(), ArgumentError> {
    validate_text(topic, MAX_TOPIC_LEN, false)?;
    if for_publish && topic.bytes().any(|b| b == b'+' || b == b'#') {
        return Err(ArgumentError::WildcardInTopic);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_join() {
        let line = Command::JoinAccessPoint {
            ssid: "FarmMain",
            password: "secret",
        }
        .encode()
        .unwrap();
        assert_eq!(line.as_str(), "AT+CWJAP=\"FarmMain\",\"secret\"");
    }

    #[test]
    fn encodes_publish_raw() {
        let line = Command::MqttPublishRaw {
            topic: "test/rp2040/sensor",
            len: 27,
            qos: QoS::AtLeastOnce,
            retain: false,
        }
        .encode()
        .unwrap();
        assert_eq!(line.as_str(), "AT+MQTTPUBRAW=0,\"test/rp2040/sensor\",27,1,0");
    }

    #[test]
    fn encodes_will_config() {
        let line = Command::MqttConnConfig {
            keepalive_secs: 120,
            will: Some(LastWill::new("test/rp2040/status", "offline")),
        }
        .encode()
        .unwrap();
        assert_eq!(
            line.as_str(),
            "AT+MQTTCONNCFG=0,120,0,\"test/rp2040/status\",\"offline\",1,0"
        );
    }

    #[test]
    fn encodes_user_config_with_empty_password() {
        let line = Command::MqttUserConfig {
            client_id: "rp2040",
            username: "",
            password: "",
        }
        .encode()
        .unwrap();
        assert_eq!(line.as_str(), "AT+MQTTUSERCFG=0,1,\"rp2040\",\"\",\"\",0,0,\"\"");
    }

    #[test]
    fn rejects_quote_in_credentials() {
        let err = Command::JoinAccessPoint {
            ssid: "evil\",\"x",
            password: "p",
        }
        .encode()
        .unwrap_err();
        assert_eq!(err, ArgumentError::DisallowedCharacter);
    }

    #[test]
    fn rejects_line_break_in_topic() {
        assert_eq!(
            validate_topic("a\r\nAT+RST", false),
            Err(ArgumentError::DisallowedCharacter)
        );
    }

    #[test]
    fn rejects_wildcards_only_when_publishing() {
        assert_eq!(validate_topic("a/+/c", true), Err(ArgumentError::WildcardInTopic));
        assert_eq!(validate_topic("a/#", false), Ok(()));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(validate_topic("", false), Err(ArgumentError::Empty));
        let long = [b'a'; MAX_SSID_LEN + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert_eq!(
            Command::JoinAccessPoint {
                ssid: long,
                password: ""
            }
            .encode()
            .unwrap_err(),
            ArgumentError::TooLong
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let err = Command::MqttPublishRaw {
            topic: "t",
            len: MAX_PUBLISH_PAYLOAD + 1,
            qos: QoS::AtMostOnce,
            retain: false,
        }
        .encode()
        .unwrap_err();
        assert_eq!(err, ArgumentError::PayloadTooLarge);
    }

    #[test]
    fn qos_levels() {
        assert_eq!(QoS::from_level(2), Some(QoS::ExactlyOnce));
        assert_eq!(QoS::from_level(3), None);
        assert_eq!(QoS::AtLeastOnce.level(), 1);
    }

    #[test]
    fn will_message_has_its_own_limit() {
        let message = [b'm'; MAX_WILL_MESSAGE_LEN + 1];
        let message = core::str::from_utf8(&message).unwrap();
        let command = Command::MqttConnConfig {
            keepalive_secs: 60,
            will: Some(LastWill::new("node/status", message)),
        };
        assert_eq!(command.encode().unwrap_err(), ArgumentError::TooLong);

        let fits = &message[..MAX_WILL_MESSAGE_LEN];
        let command = Command::MqttConnConfig {
            keepalive_secs: 60,
            will: Some(LastWill::new("node/status", fits)),
        };
        assert!(command.encode().is_ok());
    }

    #[test]
    fn only_credential_commands_are_sensitive() {
        assert!(
            Command::JoinAccessPoint {
                ssid: "FarmMain",
                password: "secret"
            }
            .is_sensitive()
        );
        assert!(
            Command::MqttUserConfig {
                client_id: "rp2040",
                username: "u",
                password: "p"
            }
            .is_sensitive()
        );
        assert!(!Command::MqttConnect { host: "broker", port: 1883 }.is_sensitive());
    }
}
