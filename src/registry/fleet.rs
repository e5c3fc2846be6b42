//! Static fleet definition
//!
//! Every component of the platform runs one specialist. The specialist's
//! port is derived from the component's own port by shifting it from the
//! component range into the AI range.

use super::specialist::SpecialistSpec;

/// First port of the component range
pub const COMPONENT_PORT_BASE: u16 = 8000;
/// First port of the specialist range
pub const AI_PORT_BASE: u16 = 45000;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MODEL: &str = "llama3.3:70b";

/// Known components and their component ports
pub const DEFAULT_COMPONENTS: &[(&str, u16)] = &[
    ("engram", 8000),
    ("hermes", 8001),
    ("ergon", 8002),
    ("rhetor", 8003),
    ("terma", 8004),
    ("athena", 8005),
    ("prometheus", 8006),
    ("harmonia", 8007),
    ("telos", 8008),
    ("synthesis", 8009),
    ("tekton_core", 8010),
    ("metis", 8011),
    ("apollo", 8012),
    ("budget", 8013),
    ("sophia", 8014),
    ("noesis", 8015),
];

/// Map a component port to its specialist port
///
/// Returns `None` when the component port lies below `port_base` or the
/// result does not fit in a port number.
pub fn ai_port_for(component_port: u16, port_base: u16, ai_port_base: u16) -> Option<u16> {
    let offset = component_port.checked_sub(port_base)?;
    ai_port_base.checked_add(offset)
}

/// Specialist id for a component
pub fn specialist_id(component: &str) -> String {
    format!("{component}-ai")
}

/// Built-in capabilities and roles per component
const PROFILES: &[(&str, &[&str], &[&str])] = &[
    ("engram", &["memory", "context_management"], &["memory"]),
    (
        "hermes",
        &["documentation", "technical_writing", "messaging"],
        &["communication"],
    ),
    ("ergon", &["automation", "agents"], &["execution"]),
    ("rhetor", &["prompt_engineering", "llm_management"], &["orchestration"]),
    ("terma", &["terminal"], &["terminal"]),
    ("athena", &["knowledge", "reasoning"], &["knowledge", "chat"]),
    ("prometheus", &["planning", "scheduling"], &["planning"]),
    ("harmonia", &["workflow"], &["orchestration"]),
    ("telos", &["requirements", "planning"], &["planning"]),
    ("synthesis", &["integration", "execution"], &["execution"]),
    ("tekton_core", &["project_management"], &["planning"]),
    ("metis", &["task_decomposition", "planning"], &["planning"]),
    (
        "apollo",
        &["code_analysis", "static_analysis", "prediction"],
        &["code-analysis"],
    ),
    ("budget", &["cost_management"], &["accounting"]),
    ("sophia", &["research", "metrics", "code_analysis"], &["research"]),
    ("noesis", &["analysis", "discovery"], &["research"]),
];

/// Capabilities and roles of a known component; empty for unknown ones
pub fn default_profile(component: &str) -> (&'static [&'static str], &'static [&'static str]) {
    PROFILES
        .iter()
        .find(|(name, _, _)| *name == component)
        .map(|(_, capabilities, roles)| (*capabilities, *roles))
        .unwrap_or((&[], &[]))
}

/// Ordered list of specialists the registry starts with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetDefinition {
    specs: Vec<SpecialistSpec>,
}

impl FleetDefinition {
    pub fn new(specs: Vec<SpecialistSpec>) -> Self {
        Self { specs }
    }

    /// The built-in platform fleet on `host`, specialists numbered from `ai_port_base`
    pub fn platform(host: &str, ai_port_base: u16) -> Self {
        let specs = DEFAULT_COMPONENTS
            .iter()
            .filter_map(|(component, component_port)| {
                let port = ai_port_for(*component_port, COMPONENT_PORT_BASE, ai_port_base)?;
                Some(component_spec(component, host, port))
            })
            .collect();
        Self { specs }
    }

    pub fn specs(&self) -> &[SpecialistSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl IntoIterator for FleetDefinition {
    type Item = SpecialistSpec;
    type IntoIter = std::vec::IntoIter<SpecialistSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.into_iter()
    }
}

/// Spec for a known component with its built-in profile
pub fn component_spec(component: &str, host: &str, port: u16) -> SpecialistSpec {
    let (capabilities, roles) = default_profile(component);
    SpecialistSpec::new(specialist_id(component), host, port)
        .with_component(component)
        .with_name(display_name(component))
        .with_model(DEFAULT_MODEL)
        .with_capabilities(capabilities.iter().copied())
        .with_roles(roles.iter().copied())
}

fn display_name(component: &str) -> String {
    component
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_port_mapping() {
        assert_eq!(ai_port_for(8005, COMPONENT_PORT_BASE, AI_PORT_BASE), Some(45005));
        assert_eq!(ai_port_for(8000, COMPONENT_PORT_BASE, AI_PORT_BASE), Some(45000));
        assert_eq!(ai_port_for(7999, COMPONENT_PORT_BASE, AI_PORT_BASE), None);
        assert_eq!(ai_port_for(u16::MAX, 0, 1), None);
    }

    #[test]
    fn test_platform_fleet() {
        let fleet = FleetDefinition::platform(DEFAULT_HOST, AI_PORT_BASE);
        assert_eq!(fleet.len(), DEFAULT_COMPONENTS.len());

        let apollo = fleet.specs().iter().find(|s| s.id == "apollo-ai").unwrap();
        assert_eq!(apollo.port, 45012);
        assert_eq!(apollo.component, "apollo");
        assert!(apollo.capabilities.iter().any(|c| c == "code_analysis"));

        let core = fleet.specs().iter().find(|s| s.id == "tekton_core-ai").unwrap();
        assert_eq!(core.name, "Tekton Core");
    }

    #[test]
    fn test_platform_fleet_with_shifted_ranges() {
        let fleet = FleetDefinition::platform("10.0.0.2", 50000);
        let engram = fleet.specs().iter().find(|s| s.id == "engram-ai").unwrap();
        assert_eq!(engram.port, 50000);
        assert_eq!(engram.host, "10.0.0.2");
    }

    #[test]
    fn test_ports_are_unique() {
        let fleet = FleetDefinition::platform(DEFAULT_HOST, AI_PORT_BASE);
        let mut ports: Vec<_> = fleet.specs().iter().map(|s| s.port).collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), fleet.len());
    }
}
