//! Wire shapes of the scheduler protocol.
//!
//! Field names and type tags follow the master's JSON API. Type tags are
//! closed enums; nothing outside this crate sees the tag strings.

use serde::{Deserialize, Serialize};

use flotilla_core::{AgentId, FrameworkId, OfferId, Range, RangeSet, Resource, TaskId};

use crate::error::{ProtocolError, ProtocolResult};

/// `{"value": "..."}` identity wrapper used for every id on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub value: String,
}

macro_rules! id_conversions {
    ($($ty:ty),*) => {$(
        impl From<&$ty> for Id {
            fn from(id: &$ty) -> Self {
                Id { value: id.as_str().to_string() }
            }
        }

        impl From<Id> for $ty {
            fn from(id: Id) -> Self {
                <$ty>::new(id.value)
            }
        }
    )*};
}

id_conversions!(OfferId, AgentId, TaskId, FrameworkId);

// ── Resources ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Scalar,
    Ranges,
    Set,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranges {
    pub range: Vec<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Ranges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl WireResource {
    pub fn from_resource(resource: &Resource, role: Option<&str>) -> Self {
        match resource {
            Resource::Scalar { name, value } => WireResource {
                name: name.clone(),
                kind: ValueType::Scalar,
                scalar: Some(Scalar { value: *value }),
                ranges: None,
                role: role.map(str::to_string),
            },
            Resource::Ranges { name, ranges } => WireResource {
                name: name.clone(),
                kind: ValueType::Ranges,
                scalar: None,
                ranges: Some(Ranges {
                    range: ranges.ranges().to_vec(),
                }),
                role: role.map(str::to_string),
            },
        }
    }

    /// Convert to a core resource. `SET` and `TEXT` values carry nothing
    /// the planner uses and come back as `None`.
    pub fn to_resource(&self) -> ProtocolResult<Option<Resource>> {
        let invalid = |source| ProtocolError::InvalidResource {
            name: self.name.clone(),
            source,
        };
        match self.kind {
            ValueType::Scalar => {
                let scalar = self
                    .scalar
                    .as_ref()
                    .ok_or(ProtocolError::MissingField("scalar"))?;
                Resource::scalar(self.name.clone(), scalar.value)
                    .map(Some)
                    .map_err(invalid)
            }
            ValueType::Ranges => {
                let ranges = self
                    .ranges
                    .as_ref()
                    .ok_or(ProtocolError::MissingField("ranges"))?;
                let set = RangeSet::new(ranges.range.clone()).map_err(invalid)?;
                Ok(Some(Resource::ranges(self.name.clone(), set)))
            }
            ValueType::Set | ValueType::Text => Ok(None),
        }
    }
}

// ── Task launch ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub shell: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Docker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u64,
    pub protocol: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerInfo {
    pub image: String,
    pub network: String,
    pub privileged: bool,
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "type")]
    pub kind: ContainerType,
    pub docker: DockerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub task_id: Id,
    pub agent_id: Id,
    pub command: CommandInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
    pub resources: Vec<WireResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub task_infos: Vec<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Launch { launch: Launch },
}

// ── Calls ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub refuse_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub framework_info: FrameworkInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub offer_ids: Vec<Id>,
    pub operations: Vec<Operation>,
    pub filters: Filters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decline {
    pub offer_ids: Vec<Id>,
    pub filters: Filters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledge {
    pub agent_id: Id,
    pub task_id: Id,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kill {
    pub task_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Id>,
}

/// The body of an outbound call, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallBody {
    Subscribe { subscribe: Subscribe },
    Accept { accept: Accept },
    Decline { decline: Decline },
    Acknowledge { acknowledge: Acknowledge },
    Kill { kill: Kill },
}

/// An outbound call. Every call but `SUBSCRIBE` carries the framework id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<Id>,
    #[serde(flatten)]
    pub body: CallBody,
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self.body {
            CallBody::Subscribe { .. } => "SUBSCRIBE",
            CallBody::Accept { .. } => "ACCEPT",
            CallBody::Decline { .. } => "DECLINE",
            CallBody::Acknowledge { .. } => "ACKNOWLEDGE",
            CallBody::Kill { .. } => "KILL",
        }
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
