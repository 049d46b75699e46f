use crate::config::ChatbotConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Study,
    Career,
    Support,
    Institution,
}

impl ResourceCategory {
    /// Unknown names fall back to the institution overview.
    pub fn parse(s: &str) -> Self {
        match s {
            "study" => Self::Study,
            "career" => Self::Career,
            "support" => Self::Support,
            _ => Self::Institution,
        }
    }
}

struct Card<'a> {
    title: &'static str,
    description: &'static str,
    link: &'a str,
    suggestions: [&'static str; 3],
}

fn card(category: ResourceCategory, cfg: &ChatbotConfig) -> Card<'_> {
    match category {
        ResourceCategory::Study => Card {
            title: "Study Resources",
            description: "Access study guides, tutorials, and academic support materials",
            link: &cfg.study_resources_link,
            suggestions: [
                "How to access the library",
                "Finding research papers",
                "Academic writing guides",
            ],
        },
        ResourceCategory::Career => Card {
            title: "Career Services",
            description: "Explore career opportunities, internships, and job preparation resources",
            link: &cfg.career_services_link,
            suggestions: [
                "Resume building help",
                "Internship opportunities",
                "Career counseling appointments",
            ],
        },
        ResourceCategory::Support => Card {
            title: "Academic Support",
            description: "Get help with coursework, tutoring, and academic advising",
            link: &cfg.academic_support_link,
            suggestions: [
                "Tutoring services",
                "Academic advising",
                "Study skills workshops",
            ],
        },
        ResourceCategory::Institution => Card {
            title: "Institution Resources",
            description: "Explore the resources available at your institution",
            link: "",
            suggestions: ["Study resources", "Career services", "Academic support"],
        },
    }
}

/// Markdown card for a resource category; the link line only appears when
/// a link is configured.
pub fn resource_card(category: ResourceCategory, cfg: &ChatbotConfig) -> String {
    let c = card(category, cfg);
    let mut text = format!("**{}**\n\n{}\n\n", c.title, c.description);
    let link = c.link.trim();
    if !link.is_empty() {
        text.push_str(&format!("**Access Now**: [{}]({})\n\n", c.title, link));
    }
    text.push_str("You might be interested in:\n");
    for s in c.suggestions {
        text.push_str(&format!("• {}\n", s));
    }
    text
}
