//! Payload shapes for servers, redirects and commands.
//!
//! These are the types named by the method and broadcast tables.  Two
//! encodings coexist on the wire:
//!
//! - Individual events and request parameters use JSON objects
//!   (`{"server": "web", "id": 3, "from": 8080, ...}`).
//! - The initial list snapshot is positional to keep it small: each server is
//!   `[name, [redirect...], [command...]]`, and each redirect/command entry is
//!   a fixed-length prefix followed by a variable number of `[isSuffix, name]`
//!   match pairs.  [`RedirectEntry`] and [`CommandEntry`] implement that
//!   positional form by hand.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Expected, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies one redirect or command: the owning server plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameId {
    pub server: String,
    pub id: u64,
}

impl NameId {
    pub fn new(server: impl Into<String>, id: u64) -> Self {
        Self {
            server: server.into(),
            id,
        }
    }
}

/// A host-name match rule.
///
/// `is_suffix = true` matches any host ending in `name`; otherwise the host
/// must equal `name` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchData {
    pub is_suffix: bool,
    pub name: String,
}

/// Positional `[isSuffix, name]` form used inside list snapshots.
#[derive(Serialize, Deserialize)]
struct MatchPair(bool, String);

/// Unix credentials a command is run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIds {
    pub uid: u32,
    pub gid: u32,
}

/// A port redirect, as sent to `addRedirect`/`modifyRedirect` and pushed on
/// the add/modify redirect channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub server: String,
    /// Ignored by `addRedirect`; the server assigns the id.
    #[serde(default)]
    pub id: u64,
    /// Local port to listen on.
    pub from: u16,
    /// Address to forward matched connections to.
    pub to: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, rename = "match")]
    pub matches: Vec<MatchData>,
}

impl Redirect {
    pub fn name_id(&self) -> NameId {
        NameId::new(self.server.clone(), self.id)
    }
}

/// A managed subprocess, as sent to `addCommand`/`modifyCommand` and pushed
/// on the add/modify command channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub server: String,
    /// Ignored by `addCommand`; the server assigns the id.
    #[serde(default)]
    pub id: u64,
    pub exe: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, rename = "workDir")]
    pub work_dir: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "match")]
    pub matches: Vec<MatchData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIds>,
}

impl Command {
    pub fn name_id(&self) -> NameId {
        NameId::new(self.server.clone(), self.id)
    }
}

/// Payload of the command-error broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub server: String,
    pub id: u64,
    pub err: String,
}

/// Run state of a managed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommandStatus {
    /// Not running (never started, or stopped by an operator).
    Stopped,
    Running,
    /// Exited on its own.
    Exited,
}

impl TryFrom<u8> for CommandStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandStatus::Stopped),
            1 => Ok(CommandStatus::Running),
            2 => Ok(CommandStatus::Exited),
            other => Err(format!("unknown command status {other}")),
        }
    }
}

impl From<CommandStatus> for u8 {
    fn from(status: CommandStatus) -> u8 {
        match status {
            CommandStatus::Stopped => 0,
            CommandStatus::Running => 1,
            CommandStatus::Exited => 2,
        }
    }
}

// ── List snapshot entries ─────────────────────────────────────────────────────

/// One server in the list snapshot: `[name, [redirect...], [command...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerListing {
    pub name: String,
    pub redirects: Vec<RedirectEntry>,
    pub commands: Vec<CommandEntry>,
}

impl Serialize for ServerListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.name, &self.redirects, &self.commands).serialize(serializer)
    }
}

/// A redirect in the list snapshot:
/// `[id, from, to, active, err, ...[isSuffix, name]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectEntry {
    pub id: u64,
    pub from: u16,
    pub to: String,
    pub active: bool,
    /// Last error reported for the redirect; empty when healthy.
    pub err: String,
    pub matches: Vec<MatchData>,
}

/// A command in the list snapshot:
/// `[id, exe, params, workDir, env, status, err, user, ...[isSuffix, name]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub id: u64,
    pub exe: String,
    pub params: Vec<String>,
    pub work_dir: String,
    pub env: BTreeMap<String, String>,
    pub status: CommandStatus,
    /// Last error reported for the command; empty when healthy.
    pub err: String,
    pub user: Option<UserIds>,
    pub matches: Vec<MatchData>,
}

fn required<'de, A, T>(seq: &mut A, index: usize, expected: &dyn Expected) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, expected))
}

fn trailing_matches<'de, A: SeqAccess<'de>>(seq: &mut A) -> Result<Vec<MatchData>, A::Error> {
    let mut matches = Vec::new();
    while let Some(MatchPair(is_suffix, name)) = seq.next_element()? {
        matches.push(MatchData { is_suffix, name });
    }
    Ok(matches)
}

fn serialize_matches<S: SerializeSeq>(seq: &mut S, matches: &[MatchData]) -> Result<(), S::Error> {
    for m in matches {
        seq.serialize_element(&(m.is_suffix, &m.name))?;
    }
    Ok(())
}

impl Serialize for RedirectEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(5 + self.matches.len()))?;
        seq.serialize_element(&self.id)?;
        seq.serialize_element(&self.from)?;
        seq.serialize_element(&self.to)?;
        seq.serialize_element(&self.active)?;
        seq.serialize_element(&self.err)?;
        serialize_matches(&mut seq, &self.matches)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RedirectEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RedirectEntryVisitor;

        impl<'de> Visitor<'de> for RedirectEntryVisitor {
            type Value = RedirectEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a redirect entry [id, from, to, active, err, ...match]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RedirectEntry, A::Error> {
                Ok(RedirectEntry {
                    id: required(&mut seq, 0, &self)?,
                    from: required(&mut seq, 1, &self)?,
                    to: required(&mut seq, 2, &self)?,
                    active: required(&mut seq, 3, &self)?,
                    err: required(&mut seq, 4, &self)?,
                    matches: trailing_matches(&mut seq)?,
                })
            }
        }

        deserializer.deserialize_seq(RedirectEntryVisitor)
    }
}

impl Serialize for CommandEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(8 + self.matches.len()))?;
        seq.serialize_element(&self.id)?;
        seq.serialize_element(&self.exe)?;
        seq.serialize_element(&self.params)?;
        seq.serialize_element(&self.work_dir)?;
        seq.serialize_element(&self.env)?;
        seq.serialize_element(&self.status)?;
        seq.serialize_element(&self.err)?;
        seq.serialize_element(&self.user)?;
        serialize_matches(&mut seq, &self.matches)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CommandEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CommandEntryVisitor;

        impl<'de> Visitor<'de> for CommandEntryVisitor {
            type Value = CommandEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(
                    "a command entry [id, exe, params, workDir, env, status, err, user, ...match]",
                )
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<CommandEntry, A::Error> {
                Ok(CommandEntry {
                    id: required(&mut seq, 0, &self)?,
                    exe: required(&mut seq, 1, &self)?,
                    params: required(&mut seq, 2, &self)?,
                    work_dir: required(&mut seq, 3, &self)?,
                    env: required(&mut seq, 4, &self)?,
                    status: required(&mut seq, 5, &self)?,
                    err: required(&mut seq, 6, &self)?,
                    user: required(&mut seq, 7, &self)?,
                    matches: trailing_matches(&mut seq)?,
                })
            }
        }

        deserializer.deserialize_seq(CommandEntryVisitor)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
