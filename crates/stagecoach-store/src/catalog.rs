use stagecoach_core::{Agent, Stage};

/// (name, description, capabilities) for one default agent.
type AgentSpec = (&'static str, &'static str, &'static [&'static str]);

/// The default roster, one slice per stage in pipeline order.
const ROSTER: [&[AgentSpec]; 6] = [
    // Stage 1: input processing
    &[
        (
            "Idea Processor",
            "Processes and structures initial project ideas",
            &["idea analysis", "requirement extraction", "initial structuring", "feasibility assessment"],
        ),
        (
            "Context Builder",
            "Builds comprehensive context and project scope",
            &["context gathering", "scope definition", "requirement documentation", "initial planning"],
        ),
    ],
    // Stage 2: validation & strategy
    &[
        (
            "Market Research",
            "Analyzes market size, competitors, and product-market fit",
            &["market analysis", "competitor research", "TAM calculation", "trend analysis"],
        ),
        (
            "Technical Architect",
            "Designs system architecture and selects tech stack",
            &["architecture design", "tech stack selection", "scalability planning", "cost estimation"],
        ),
    ],
    // Stage 3: development
    &[
        (
            "UI/UX Designer",
            "Creates user interfaces and experiences",
            &["wireframing", "UI design", "UX flows", "responsive design", "accessibility"],
        ),
        (
            "Full-Stack Dev",
            "Writes frontend and backend code",
            &["React/Vue/Angular", "Node.js/Python", "API development", "database design"],
        ),
        (
            "QA & Security",
            "Automated testing and security scanning",
            &["unit testing", "integration testing", "security audits", "penetration testing"],
        ),
        (
            "DevOps Pipeline",
            "CI/CD automation and deployment",
            &["CI/CD setup", "containerization", "auto-scaling", "monitoring"],
        ),
    ],
    // Stage 4: go-to-market
    &[
        (
            "Business Setup",
            "Handles business formation and compliance",
            &["company formation", "legal compliance", "trademark filing", "terms of service"],
        ),
        (
            "Content Marketing",
            "Creates and distributes content",
            &["blog writing", "SEO optimization", "social media", "email campaigns"],
        ),
        (
            "Sales Automation",
            "Automates sales outreach and conversion",
            &["lead generation", "email outreach", "demo scheduling", "proposal creation"],
        ),
    ],
    // Stage 5: business operations
    &[
        (
            "Customer Support",
            "24/7 intelligent customer service",
            &["ticket handling", "live chat", "knowledge base", "escalation management"],
        ),
        (
            "Analytics Engine",
            "Real-time business intelligence",
            &["KPI tracking", "predictive analytics", "reporting", "anomaly detection"],
        ),
        (
            "Finance Manager",
            "Automated accounting and finance",
            &["bookkeeping", "invoicing", "expense tracking", "financial forecasting"],
        ),
    ],
    // Stage 6: self-improvement
    &[
        (
            "System Optimizer",
            "Continuously optimizes all systems",
            &["performance tuning", "cost optimization", "workflow improvement", "A/B testing"],
        ),
    ],
];

/// The default agent roster, in creation (and therefore execution) order.
///
/// Fifteen agents across the six stages, each with a system prompt
/// generated from its description and capabilities.
pub fn default_agents() -> Vec<Agent> {
    Stage::FIRST
        .through_final()
        .zip(ROSTER)
        .flat_map(|(stage, specs)| {
            specs.iter().map(move |(name, description, capabilities)| {
                Agent::new(*name, stage, *description).with_capabilities(
                    capabilities.iter().map(|c| (*c).to_string()).collect(),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_size_and_distribution() {
        let agents = default_agents();
        assert_eq!(agents.len(), 15);

        let per_stage = |n: u8| {
            agents
                .iter()
                .filter(|a| a.stage == Stage::new(n).unwrap())
                .count()
        };
        assert_eq!(per_stage(1), 2);
        assert_eq!(per_stage(2), 2);
        assert_eq!(per_stage(3), 4);
        assert_eq!(per_stage(4), 3);
        assert_eq!(per_stage(5), 3);
        assert_eq!(per_stage(6), 1);
    }

    #[test]
    fn test_roster_names_are_unique() {
        let agents = default_agents();
        let mut names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 15);
    }

    #[test]
    fn test_generated_prompts_mention_capabilities() {
        let agents = default_agents();
        let research = agents
            .iter()
            .find(|a| a.name == "Market Research")
            .unwrap();
        assert!(research.system_prompt.contains("expert Market Research agent"));
        assert!(research.system_prompt.contains("market analysis, competitor research"));
    }

    #[test]
    fn test_roster_defaults() {
        for agent in default_agents() {
            assert!(agent.is_active);
            assert_eq!(agent.temperature, 0.7);
            assert_eq!(agent.max_tokens, 2000);
            assert_eq!(agent.model, stagecoach_core::DEFAULT_MODEL);
        }
    }
}
