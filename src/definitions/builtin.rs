use super::schema::AgentSpec;
use crate::types::{AgentConfig, AgentType};

/// Capabilities the stock agents of each builtin type advertise.
pub fn builtin_capabilities(agent_type: &AgentType) -> Vec<String> {
    let caps: &[&str] = match agent_type {
        AgentType::Frontend => &["typescript", "react", "css", "ui"],
        AgentType::Backend => &["rust", "api", "database"],
        AgentType::Testing => &["testing", "unit-tests", "integration-tests"],
        AgentType::CodeReview => &["review", "lint"],
        AgentType::Documentation => &["docs", "markdown"],
        AgentType::DevOps => &["ci", "deploy", "containers"],
        AgentType::Custom(_) => &[],
    };
    caps.iter().map(|c| c.to_string()).collect()
}

/// One agent per builtin type, used when no fleet file is given.
pub fn default_fleet() -> Vec<AgentSpec> {
    AgentType::BUILTIN
        .iter()
        .map(|agent_type| {
            AgentSpec::new(
                format!("{}-1", agent_type.as_str()),
                AgentConfig::default_for(agent_type),
                builtin_capabilities(agent_type),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fleet_covers_builtin_types() {
        let fleet = default_fleet();
        assert_eq!(fleet.len(), AgentType::BUILTIN.len());
        for spec in &fleet {
            assert!(!spec.capabilities.is_empty());
        }
        assert_eq!(fleet[3].id, "code-review-1");
    }
}
