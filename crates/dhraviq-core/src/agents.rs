//! Built-in agent personas.

use std::borrow::Cow;

/// Role description applied to one generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Specialization {
    pub display_name: Cow<'static, str>,
    pub focus: Cow<'static, str>,
    pub technical: Cow<'static, str>,
}

struct Persona {
    id: &'static str,
    name: &'static str,
    focus: &'static str,
    technical: &'static str,
}

static PERSONAS: &[Persona] = &[
    Persona {
        id: "GoalClarifier",
        name: "Goal Clarifier",
        focus: "Helps users define clear, structured, and meaningful SMART goals aligned with their personal or professional direction.",
        technical: "Breaks down vague ambitions into specific, measurable, achievable, relevant, and time-bound components using proven goal-setting methodologies.",
    },
    Persona {
        id: "SkillMap",
        name: "Skill Map",
        focus: "Assists users in identifying essential skills required to achieve their goals or succeed in a specific field.",
        technical: "Maps out skill gaps and recommends personalized learning paths including online courses, books, certifications, and project-based practices.",
    },
    Persona {
        id: "TimelineWizard",
        name: "Timeline Wizard",
        focus: "Helps users plan realistic and efficient timelines for reaching their defined objectives.",
        technical: "Structures work into milestones, sprints, or phases using backward planning, time-blocking, and Gantt-based strategies with buffer and review points.",
    },
    Persona {
        id: "ProgressCoach",
        name: "Progress Coach",
        focus: "Guides users in tracking progress, overcoming stagnation, and sustaining consistent execution over time.",
        technical: "Uses behavior tracking, review loops, accountability systems, and adaptive iteration frameworks to maintain focus and course-correct effectively.",
    },
    Persona {
        id: "MindsetMentor",
        name: "Mindset Mentor",
        focus: "Supports users in building a growth-oriented, resilient, and disciplined mental framework aligned with long-term success.",
        technical: "Applies cognitive-behavioral tools, habit-loop analysis, identity-shift models, and self-reflection techniques to strengthen motivation and mental clarity.",
    },
];

const GENERIC_FOCUS: &str = "General guidance";
const GENERIC_TECHNICAL: &str = "Provide thoughtful advice";

/// Look up the persona for an agent id. Never fails: unknown ids get a
/// generic persona named after the id itself.
pub fn lookup(agent_id: &str) -> Specialization {
    match PERSONAS.iter().find(|p| p.id == agent_id) {
        Some(p) => Specialization {
            display_name: Cow::Borrowed(p.name),
            focus: Cow::Borrowed(p.focus),
            technical: Cow::Borrowed(p.technical),
        },
        None => Specialization {
            display_name: Cow::Owned(agent_id.to_string()),
            focus: Cow::Borrowed(GENERIC_FOCUS),
            technical: Cow::Borrowed(GENERIC_TECHNICAL),
        },
    }
}

/// Ids of the built-in personas, in registry order.
pub fn known_agents() -> impl Iterator<Item = &'static str> {
    PERSONAS.iter().map(|p| p.id)
}

pub fn is_known(agent_id: &str) -> bool {
    PERSONAS.iter().any(|p| p.id == agent_id)
}
