//! Building outbound calls.
//!
//! [`subscribe`] needs no identity. Everything else goes through a
//! [`CallFactory`], which only exists once the master has handed out a
//! framework id.

use indexmap::IndexSet;

use flotilla_core::config::{ContainerConfig, FrameworkConfig};
use flotilla_core::{AckToken, AgentId, FrameworkId, OfferId, PORTS, Resource, TaskId, TaskSpec};
use flotilla_placement::Assignment;

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::*;

/// Role attached to the ports resource of a launch.
const DEFAULT_ROLE: &str = "*";

/// Build the `SUBSCRIBE` call that opens the event stream.
pub fn subscribe(framework: &FrameworkConfig) -> Call {
    Call {
        framework_id: None,
        body: CallBody::Subscribe {
            subscribe: Subscribe {
                framework_info: FrameworkInfo {
                    user: framework.user.clone(),
                    name: framework.name.clone(),
                    roles: framework.roles.clone(),
                },
            },
        },
    }
}

/// Distinct offer ids of `assignments`, in first-seen order.
pub fn unique_offer_ids<'a>(assignments: impl IntoIterator<Item = &'a Assignment>) -> IndexSet<OfferId> {
    assignments
        .into_iter()
        .map(|a| a.offer_id.clone())
        .collect()
}

/// Builds calls on behalf of a subscribed framework.
#[derive(Debug, Clone)]
pub struct CallFactory {
    framework_id: FrameworkId,
    refuse_seconds: f64,
    container: ContainerConfig,
}

impl CallFactory {
    pub fn new(framework_id: FrameworkId, refuse_seconds: f64, container: ContainerConfig) -> Self {
        Self {
            framework_id,
            refuse_seconds,
            container,
        }
    }

    pub fn framework_id(&self) -> &FrameworkId {
        &self.framework_id
    }

    fn envelope(&self, body: CallBody) -> Call {
        Call {
            framework_id: Some(Id::from(&self.framework_id)),
            body,
        }
    }

    fn filters(&self) -> Filters {
        Filters {
            refuse_seconds: self.refuse_seconds,
        }
    }

    /// `ACCEPT` launching every `(assignment, spec)` pair in one `LAUNCH`
    /// operation. Task order is preserved.
    pub fn accept(&self, launches: &[(&Assignment, &TaskSpec)]) -> ProtocolResult<Call> {
        if launches.is_empty() {
            return Err(ProtocolError::EmptyAccept);
        }
        let offer_ids = unique_offer_ids(launches.iter().map(|(a, _)| *a))
            .iter()
            .map(Id::from)
            .collect();
        let task_infos = launches
            .iter()
            .map(|(assignment, spec)| self.task_info(assignment, spec))
            .collect();

        Ok(self.envelope(CallBody::Accept {
            accept: Accept {
                offer_ids,
                operations: vec![Operation::Launch {
                    launch: Launch { task_infos },
                }],
                filters: self.filters(),
            },
        }))
    }

    /// `DECLINE` for `offer_ids`, keeping their order.
    pub fn decline<'a>(&self, offer_ids: impl IntoIterator<Item = &'a OfferId>) -> Call {
        self.envelope(CallBody::Decline {
            decline: Decline {
                offer_ids: offer_ids.into_iter().map(Id::from).collect(),
                filters: self.filters(),
            },
        })
    }

    pub fn acknowledge(&self, agent_id: &AgentId, task_id: &TaskId, uuid: &AckToken) -> Call {
        self.envelope(CallBody::Acknowledge {
            acknowledge: Acknowledge {
                agent_id: Id::from(agent_id),
                task_id: Id::from(task_id),
                uuid: uuid.as_str().to_string(),
            },
        })
    }

    pub fn kill(&self, task_id: &TaskId, agent_id: Option<&AgentId>) -> Call {
        self.envelope(CallBody::Kill {
            kill: Kill {
                task_id: Id::from(task_id),
                agent_id: agent_id.map(Id::from),
            },
        })
    }

    /// Launch description for one placed task.
    pub fn task_info(&self, assignment: &Assignment, spec: &TaskSpec) -> TaskInfo {
        let resources = assignment
            .resources()
            .iter()
            .map(|r| {
                let role = match r {
                    Resource::Ranges { name, .. } if name == PORTS => Some(DEFAULT_ROLE),
                    _ => None,
                };
                WireResource::from_resource(r, role)
            })
            .collect();

        TaskInfo {
            name: spec.name.clone(),
            task_id: Id::from(&assignment.task_id),
            agent_id: Id::from(&assignment.agent_id),
            command: match &spec.command {
                Some(value) => CommandInfo {
                    shell: true,
                    value: Some(value.clone()),
                },
                None => CommandInfo {
                    shell: false,
                    value: None,
                },
            },
            container: spec
                .image
                .as_ref()
                .map(|image| self.container_info(image, &assignment.ports)),
            resources,
        }
    }

    fn container_info(&self, image: &str, host_ports: &[u64]) -> ContainerInfo {
        let container_ports = [self.container.primary_port, self.container.auxiliary_port];
        let port_mappings = container_ports
            .iter()
            .zip(host_ports)
            .map(|(container_port, host_port)| PortMapping {
                container_port: *container_port,
                host_port: *host_port,
                protocol: self.container.port_protocol.clone(),
                name: self.container.port_name.clone(),
            })
            .collect();

        ContainerInfo {
            kind: ContainerType::Docker,
            docker: DockerInfo {
                image: image.to_string(),
                network: self.container.network.clone(),
                privileged: self.container.privileged,
                port_mappings,
            },
        }
    }
}
