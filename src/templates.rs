//! Goal templates — static question sets keyed by retirement-goal category.
//!
//! Loaded once at startup and read-only thereafter. Classification always
//! resolves to exactly one of the known names; anything else falls back to
//! `default`.

/// A named, predefined set of fields-with-importance for one goal category.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    description: String,
    fields: Vec<(String, u8)>,
}

impl Template {
    fn new(name: &str, description: &str, fields: &[(&str, u8)]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            fields: fields
                .iter()
                .map(|(field, importance)| (field.to_string(), *importance))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Fields with importance weights, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, u8)> {
        self.fields
            .iter()
            .map(|(field, importance)| (field.as_str(), *importance))
    }
}

/// Registry of the known goal templates.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

pub const DEFAULT_TEMPLATE: &str = "default";

impl TemplateRegistry {
    /// The five built-in categories.
    pub fn builtin() -> Self {
        let templates = vec![
            Template::new(
                "spend",
                "For users whose primary goal is to fully enjoy their wealth during \
                 retirement by actively spending down their savings. They prioritize \
                 lifestyle, travel, personal enjoyment, and maximizing quality of life \
                 rather than preserving or growing assets long-term, and are comfortable \
                 with their funds being fully depleted by the end of retirement.",
                &[
                    ("retirement_age", 5),
                    ("desired_monthly_spending", 5),
                    ("large_planned_expenses", 4),
                    ("travel_frequency", 3),
                    ("lifestyle_upgrades", 2),
                ],
            ),
            Template::new(
                "leave",
                "For users whose main goal is to leave a financial legacy to children, \
                 family members, or other chosen beneficiaries. Focuses on estate \
                 planning, inheritance allocation, and long-term financial security for \
                 loved ones. These users value generational wealth and structured estate \
                 distribution.",
                &[
                    ("number_of_beneficiaries", 5),
                    ("beneficiary_relationships", 4),
                    ("inheritance_goal_amount", 5),
                    ("estate_distribution_preferences", 3),
                    ("life_insurance_status", 2),
                ],
            ),
            Template::new(
                "save",
                "For users who prioritize long-term financial stability, low-risk \
                 planning, and maintaining wealth throughout retirement. They want their \
                 savings to last as long as possible, with essential spending, \
                 predictable budgeting, and protected investments, and prefer steady, \
                 conservative strategies that minimize risk.",
                &[
                    ("retirement_age", 4),
                    ("expected_monthly_expenses", 5),
                    ("risk_tolerance", 4),
                    ("healthcare_budget", 5),
                    ("expected_retirement_duration", 3),
                ],
            ),
            Template::new(
                "donate",
                "For users whose primary retirement objective is to contribute a portion \
                 of their wealth to charitable causes, nonprofit organizations, or \
                 philanthropic efforts. Their focus may be planned giving, recurring \
                 donations, end-of-life charitable contributions, or allocating a \
                 percentage of their estate to causes they care about.",
                &[
                    ("charity_names", 4),
                    ("donation_goal_amount", 5),
                    ("donation_frequency", 3),
                    ("donation_timing", 4),
                    ("legacy_donation_percentage", 2),
                ],
            ),
            Template::new(
                DEFAULT_TEMPLATE,
                "Used when the goal does not fit any category clearly.",
                &[
                    ("retirement_age", 4),
                    ("expected_monthly_expenses", 5),
                    ("risk_tolerance", 4),
                    ("healthcare_budget", 5),
                    ("inheritance_goal_amount", 3),
                ],
            ),
        ];
        Self { templates }
    }

    /// Look up a template by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Template> {
        let name = name.trim();
        self.templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// The fallback template.
    pub fn default_template(&self) -> &Template {
        self.get(DEFAULT_TEMPLATE)
            .unwrap_or(&self.templates[self.templates.len() - 1])
    }

    /// Resolve a classifier answer to a known template, coercing anything
    /// unrecognized to the fallback.
    pub fn resolve(&self, name: &str) -> &Template {
        match self.get(name) {
            Some(template) => template,
            None => {
                tracing::warn!(answer = name, "Unrecognized goal category, using default");
                self.default_template()
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }

    /// `- name: description` lines for the classification prompt.
    pub fn descriptions_block(&self) -> String {
        self.templates
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
