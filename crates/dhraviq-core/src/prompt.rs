use crate::agents::Specialization;

const INSTRUCTIONS: &str = "\
Instructions:
- If the user input is a casual greeting (like 'hi', 'hello', 'hey'), reply with a short, formal one-line introduction stating your field of expertise.
- If the user input is a topic-specific question related to your domain, give a detailed, insightful, and structured answer.
- Focus strictly on your assigned specialization. Do not generalize or go beyond your expertise.
- Use markdown formatting to enhance clarity:
  • Use **bold** for important keywords or subheadings
  • Use numbered steps or bullet points for methods, frameworks, or strategies
  • Include relevant tools, techniques, or frameworks from your field
- Never ask the user to rephrase their input. Respond constructively and helpfully regardless of input quality.
- Maintain a professional, concise, and informative tone. Avoid casual or motivational language unless the context requires it.";

/// Build the role-constrained prompt for one agent.
pub fn build(persona: &Specialization, question: &str) -> String {
    format!(
        "You are an expert agent named {name}.\n\
         Your role is to help users with the following specialization:\n\
         {focus}\n\n\
         Technical expertise: {technical}\n\n\
         User Input: \"{question}\"\n\n\
         {INSTRUCTIONS}\n\n\
         Your Response:",
        name = persona.display_name,
        focus = persona.focus,
        technical = persona.technical,
        question = question.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents;

    #[test]
    fn embeds_persona_and_question() {
        let persona = agents::lookup("SkillMap");
        let prompt = build(&persona, "How do I learn Rust?");
        assert!(prompt.contains("Skill Map"));
        assert!(prompt.contains("How do I learn Rust?"));
        assert!(prompt.contains(persona.focus.as_ref()));
        assert!(prompt.contains(persona.technical.as_ref()));
    }

    #[test]
    fn question_is_trimmed() {
        let persona = agents::lookup("SkillMap");
        let prompt = build(&persona, "   hi \n");
        assert!(prompt.contains("User Input: \"hi\""));
    }

    #[test]
    fn identical_inputs_give_identical_prompts() {
        let persona = agents::lookup("TimelineWizard");
        assert_eq!(build(&persona, "plan my year"), build(&persona, "plan my year"));
    }

    #[test]
    fn generic_persona_prompt_is_non_empty() {
        let persona = agents::lookup("Custom");
        let prompt = build(&persona, "hello");
        assert!(!prompt.is_empty());
        assert!(prompt.contains("Custom"));
        assert!(prompt.ends_with("Your Response:"));
    }
}
