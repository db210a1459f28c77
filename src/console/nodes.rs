//! Client and server node lists served by `/getnodes`

use crate::console::constants::LOOPBACK_CLIENT;
use crate::console::error::{ConsoleError, Result};
use crate::console::tabs::App;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Key of the client list that applies to every app
pub const ALL_APPS_KEY: &str = "all";

/// A test endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Node {
    pub name: String,
    pub isdas: String,
    pub addr: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

impl Node {
    /// ISD-AS in display form (`1-ff00:0:111`); files may store `_` for `:`
    pub fn ia(&self) -> String {
        self.isdas.replace('_', ":")
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Which side of the test a node list is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Client,
    Server,
}

impl NodeRole {
    /// Suffix of the form fields filled from the selected node
    pub fn suffix(self) -> &'static str {
        match self {
            NodeRole::Client => "cli",
            NodeRole::Server => "ser",
        }
    }
}

/// Named node lists the backend knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeList {
    ClientsDefault,
    ServersDefault,
    ServersUser,
}

impl NodeList {
    /// Value of the `node_type` request field
    pub fn name(self) -> &'static str {
        match self {
            NodeList::ClientsDefault => "clients_default",
            NodeList::ServersDefault => "servers_default",
            NodeList::ServersUser => "servers_user",
        }
    }

    /// Server list to use with the chosen client: local servers for the
    /// loopback interface, the default list otherwise
    pub fn servers_for(client: &Node) -> Self {
        if client.name == LOOPBACK_CLIENT {
            NodeList::ServersUser
        } else {
            NodeList::ServersDefault
        }
    }
}

/// Node lists keyed by app name (`all` for clients)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct NodeCatalog(HashMap<String, Vec<Node>>);

impl NodeCatalog {
    /// Parse a `/getnodes` response
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, "Malformed node list");
            ConsoleError::Upstream(format!("node list is not valid JSON: {}", e))
        })
    }

    pub fn nodes(&self, key: &str) -> Option<&[Node]> {
        self.0.get(key).map(Vec::as_slice)
    }
}

/// Loaded node lists and the current selection for each role
#[derive(Debug, Clone, Default)]
pub struct NodeSelection {
    clients: Option<NodeCatalog>,
    servers: Option<NodeCatalog>,
    selected_client: usize,
    selected_server: usize,
}

impl NodeSelection {
    pub fn set_catalog(&mut self, role: NodeRole, catalog: NodeCatalog) {
        debug!(role = role.suffix(), "Node list loaded");
        match role {
            NodeRole::Client => {
                self.clients = Some(catalog);
                self.selected_client = 0;
            }
            NodeRole::Server => {
                self.servers = Some(catalog);
                self.selected_server = 0;
            }
        }
    }

    /// Options offered for `role` while `app` is the active tab
    pub fn options(&self, role: NodeRole, app: App) -> Result<&[Node]> {
        let (catalog, key) = match role {
            NodeRole::Client => (&self.clients, ALL_APPS_KEY),
            NodeRole::Server => (&self.servers, app.name()),
        };
        let catalog = catalog.as_ref().ok_or_else(|| {
            ConsoleError::Upstream(format!("no {} node list loaded", role.suffix()))
        })?;
        catalog.nodes(key).ok_or_else(|| {
            ConsoleError::Upstream(format!("node list has no entry for '{}'", key))
        })
    }

    /// Select the option at `index`, keeping the old selection if it is out of range
    pub fn select(&mut self, role: NodeRole, app: App, index: usize) -> Result<&Node> {
        let len = self.options(role, app)?.len();
        if index >= len {
            return Err(ConsoleError::Config(format!(
                "{} node {} does not exist ({} listed)",
                role.suffix(),
                index,
                len
            )));
        }
        match role {
            NodeRole::Client => self.selected_client = index,
            NodeRole::Server => self.selected_server = index,
        }
        self.selected(role, app)
    }

    /// Select by node name
    pub fn select_named(&mut self, role: NodeRole, app: App, name: &str) -> Result<&Node> {
        let index = self
            .options(role, app)?
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| {
                ConsoleError::Config(format!("no {} node named '{}'", role.suffix(), name))
            })?;
        self.select(role, app, index)
    }

    pub fn selected(&self, role: NodeRole, app: App) -> Result<&Node> {
        let index = match role {
            NodeRole::Client => self.selected_client,
            NodeRole::Server => self.selected_server,
        };
        let options = self.options(role, app)?;
        options.get(index).or_else(|| options.first()).ok_or_else(|| {
            ConsoleError::Upstream(format!("{} node list for {} is empty", role.suffix(), app))
        })
    }

    /// Form fields `ia_*`, `addr_*`, `port_*` for the selected node
    pub fn form_fields(&self, role: NodeRole, app: App) -> Result<Vec<(String, String)>> {
        let node = self.selected(role, app)?;
        let suffix = role.suffix();
        Ok(vec![
            (format!("ia_{}", suffix), node.ia()),
            (format!("addr_{}", suffix), node.addr.clone()),
            (format!("port_{}", suffix), node.port.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENTS: &str = r#"{ "all": [
        {"name":"enp0s3", "isdas":"1-ff00_0_111", "addr":"10.0.2.15","port":30001},
        {"name":"lo", "isdas":"1-ff00_0_111", "addr":"127.0.0.1","port":"30001"} ] }"#;
    const SERVERS: &str = r#"{ "bwtester": [{"name":"localhost","isdas":"1-ff00:0:112", "addr":"127.0.0.2","port":30100}],
        "camerapp": [{"name":"localhost","isdas":"1-ff00:0:112", "addr":"127.0.0.2","port":42002}],
        "sensorapp": [] }"#;

    fn loaded() -> NodeSelection {
        let mut nodes = NodeSelection::default();
        nodes.set_catalog(NodeRole::Client, NodeCatalog::from_json(CLIENTS).unwrap());
        nodes.set_catalog(NodeRole::Server, NodeCatalog::from_json(SERVERS).unwrap());
        nodes
    }

    #[test]
    fn test_client_fields_use_colon_ia() {
        let nodes = loaded();
        let fields = nodes.form_fields(NodeRole::Client, App::BwTester).unwrap();
        assert_eq!(
            fields,
            vec![
                ("ia_cli".to_string(), "1-ff00:0:111".to_string()),
                ("addr_cli".to_string(), "10.0.2.15".to_string()),
                ("port_cli".to_string(), "30001".to_string()),
            ]
        );
    }

    #[test]
    fn test_server_options_follow_active_app() {
        let nodes = loaded();
        let bw = nodes.selected(NodeRole::Server, App::BwTester).unwrap();
        assert_eq!(bw.port, 30100);
        let cam = nodes.selected(NodeRole::Server, App::CamerApp).unwrap();
        assert_eq!(cam.port, 42002);
        assert!(nodes.selected(NodeRole::Server, App::SensorApp).is_err());
    }

    #[test]
    fn test_loopback_selects_user_servers() {
        let mut nodes = loaded();
        let lo = nodes
            .select_named(NodeRole::Client, App::BwTester, "lo")
            .unwrap()
            .clone();
        assert_eq!(lo.port, 30001);
        assert_eq!(NodeList::servers_for(&lo), NodeList::ServersUser);
        let enp = nodes.select(NodeRole::Client, App::BwTester, 0).unwrap().clone();
        assert_eq!(NodeList::servers_for(&enp).name(), "servers_default");
        assert!(nodes.select(NodeRole::Client, App::BwTester, 5).is_err());
    }

    #[test]
    fn test_malformed_json_is_upstream_error() {
        let err = NodeCatalog::from_json("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ConsoleError::Upstream(_)));
    }
}
