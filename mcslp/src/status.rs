//! Status results and the two payload formats they are read from.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{Error, motd, packet};

/// The server status.
///
/// More information can be found [here](https://wiki.vg/Server_List_Ping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingResult {
    /// The version of the server.
    pub version: Version,
    /// Information about online players.
    pub players: Players,
    /// The MOTD, flattened to legacy `§` formatting.
    pub motd: String,
    /// The server icon as a `data:` URI, or empty. Not validated.
    pub favicon: String,
    /// Milliseconds spent waiting for the response's length header.
    pub latency_ms: u64,
    /// Forge mod information, when the server advertises it.
    pub mod_info: Option<ModInfo>,
}

/// Information about the server's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    /// The name of the version the server is running.
    ///
    /// In practice this comes in a large variety of different formats.
    pub name: String,
    /// See [Protocol Version Numbers](https://wiki.vg/Protocol_version_numbers).
    pub protocol: i32,
}

/// The stats for players on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Players {
    pub max: i32,
    pub online: i32,
    /// A preview of which players are online.
    ///
    /// In practice servers often don't send this or use it for more advertising.
    pub sample: Vec<Player>,
}

/// An online player of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub name: String,
    /// The player's UUID.
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModInfo {
    /// Loader type, `FML` for Forge.
    #[serde(rename = "type")]
    pub kind: String,
    pub mods: Vec<Mod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mod {
    pub id: String,
    pub version: String,
}

const UNKNOWN: &str = "Unknown";

/// The modern status payload as servers send it.
///
/// Every field is optional and read leniently: a value of the wrong shape is
/// treated like an absent one instead of failing the whole response.
#[derive(Deserialize)]
struct StatusPayload {
    #[serde(default, deserialize_with = "lenient")]
    version: Option<VersionPayload>,
    #[serde(default, deserialize_with = "lenient")]
    players: Option<PlayersPayload>,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default, deserialize_with = "text")]
    favicon: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    modinfo: Option<ModInfoPayload>,
}

#[derive(Deserialize)]
struct VersionPayload {
    #[serde(default, deserialize_with = "text")]
    name: Option<String>,
    /// Some proxies report the protocol here instead.
    #[serde(default, deserialize_with = "int")]
    id: Option<i32>,
    #[serde(default, deserialize_with = "int")]
    protocol: Option<i32>,
}

#[derive(Deserialize)]
struct PlayersPayload {
    #[serde(default, deserialize_with = "int")]
    max: Option<i32>,
    #[serde(default, deserialize_with = "int")]
    online: Option<i32>,
    #[serde(default, deserialize_with = "lenient")]
    sample: Option<Vec<PlayerPayload>>,
}

#[derive(Deserialize)]
struct PlayerPayload {
    #[serde(default, deserialize_with = "text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "text")]
    id: Option<String>,
}

#[derive(Deserialize)]
struct ModInfoPayload {
    #[serde(rename = "type", default, deserialize_with = "text")]
    kind: Option<String>,
    #[serde(rename = "modList", default, deserialize_with = "lenient")]
    mod_list: Option<Vec<ModPayload>>,
}

#[derive(Deserialize)]
struct ModPayload {
    #[serde(default, deserialize_with = "text")]
    modid: Option<String>,
    #[serde(default, deserialize_with = "text")]
    version: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl PingResult {
    /// Builds a result from the JSON text of a modern status response.
    ///
    /// Only `version` is required; every other field falls back to an empty
    /// value.
    ///
    /// # Errors
    /// [`Error::MalformedResponse`] if `json` is not a JSON object, and
    /// [`Error::MissingField`] if `version` is absent or null.
    pub fn from_status_json(json: &str, latency_ms: u64) -> Result<Self, Error> {
        let root: Value = serde_json::from_str(json).map_err(Error::MalformedResponse)?;
        log_payload(&root);
        let payload = StatusPayload::deserialize(&root).map_err(Error::MalformedResponse)?;

        let version = payload.version.ok_or(Error::MissingField("version"))?;
        let version = Version {
            name: version.name.unwrap_or_else(|| UNKNOWN.to_owned()),
            protocol: version.id.or(version.protocol).unwrap_or(-1),
        };
        let players = payload.players.map_or_else(Players::default, |players| Players {
            max: players.max.unwrap_or(0),
            online: players.online.unwrap_or(0),
            sample: players
                .sample
                .unwrap_or_default()
                .into_iter()
                .map(|player| Player {
                    name: player.name.unwrap_or_default(),
                    id: player.id.unwrap_or_default(),
                })
                .collect(),
        });
        let mod_info = payload.modinfo.map(|info| ModInfo {
            kind: info.kind.unwrap_or_else(|| UNKNOWN.to_owned()),
            mods: info
                .mod_list
                .unwrap_or_default()
                .into_iter()
                .filter_map(|entry| {
                    Some(Mod {
                        id: entry.modid?,
                        version: entry.version.unwrap_or_default(),
                    })
                })
                .collect(),
        });

        Ok(Self {
            version,
            players,
            motd: motd::decode(payload.description.as_ref()),
            favicon: payload.favicon.unwrap_or_default(),
            latency_ms,
            mod_info,
        })
    }
}

fn log_payload(root: &Value) {
    if !tracing::enabled!(target: "mcslp::ping", tracing::Level::DEBUG) {
        return;
    }
    let mut shown = root.clone();
    if let Some(favicon) = shown.get_mut("favicon") {
        *favicon = Value::String("...".into());
    }
    debug!(target: "mcslp::ping", payload = %shown, "status response");
}

/// Parses the reply to a legacy (pre-Netty) ping.
///
/// The reply is decoded as UTF-8 and split on `"\0\0\0"`; only every other
/// character of each piece is kept, since the wire form is UTF-16. The fields
/// are `[kick marker, protocol, version, motd, online, max]`.
///
/// Returns `Ok(None)` if fewer than six fields are present.
///
/// # Errors
/// [`Error::UnrecognizedLegacyResponse`] if the reply is shorter than 21 bytes
/// or does not start with the kick marker, and [`Error::ProtocolViolation`] if
/// a numeric field does not parse.
pub fn parse_legacy(data: &[u8]) -> Result<Option<PingResult>, Error> {
    if data.len() < 21 || data[0] != packet::LEGACY_KICK {
        return Err(Error::UnrecognizedLegacyResponse);
    }
    let decoded = String::from_utf8_lossy(data);
    let fields: Vec<String> = decoded
        .split("\0\0\0")
        .map(|part| part.chars().step_by(2).collect())
        .collect();
    if fields.len() < 6 {
        debug!(target: "mcslp::ping", fields = fields.len(), "legacy response has too few fields");
        return Ok(None);
    }
    let number = |i: usize| {
        fields[i].parse::<i32>().map_err(|e| {
            Error::ProtocolViolation(format!("legacy field {i} ({:?}): {e}", fields[i]))
        })
    };
    Ok(Some(PingResult {
        version: Version {
            name: fields[2].clone(),
            protocol: number(1)?,
        },
        players: Players {
            max: number(5)?,
            online: number(4)?,
            sample: Vec::new(),
        },
        motd: fields[3].clone(),
        favicon: String::new(),
        latency_ms: 0,
        mod_info: Some(ModInfo::default()),
    }))
}
