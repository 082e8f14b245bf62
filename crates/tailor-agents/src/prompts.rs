//! System instructions and user payloads for every model call.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever an instruction changes
//! so run reports can be traced back to the wording that produced them.

/// Prompt version. Bump on any instruction change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// Rubric categories the judge scores on, in output order.
pub fn rubric_categories(interest: &str) -> [String; 4] {
    [
        "All CS concepts from the reference chapter have been accurately explained".to_string(),
        format!("The {interest} concepts are sufficiently used"),
        format!("The {interest} concepts are accurately used"),
        format!(
            "The {interest} concepts do not overshadow the CS concepts \
             (the main subject to be taught is CS)"
        ),
    ]
}

/// Wrap `body` in the `[The Start of X]` / `[The End of X]` delimiters.
pub fn delimited(label: &str, body: &str) -> String {
    format!("[The Start of {label}]\n{body}\n[The End of {label}]")
}

// ── Concept personalizer ─────────────────────────────────────────────────────

pub const EXTRACT_CONCEPTS: &str = "\
You are a helpful computer science professor. Extract the main technical concepts \
taught in the following computer science textbook chapter written in markdown format. \
The main technical concepts are likely in the headers. List them in the order the \
chapter teaches them. If the chapter uses a specific programming language, put its \
name in the 'language' field; otherwise leave the 'language' field empty.";

pub const WRITE_OUTLINE: &str = "\
You are a thoughtful computer science textbook author. For each provided concept, \
find where the chapter teaches it and write the ordered layout used to teach it: \
the sequence of sub-topics, examples, and code blocks, one short phrase each. \
Only include concepts that map onto the chapter's structure; leave out any concept \
you cannot locate in the chapter. Keep the concept names exactly as given.";

pub fn outline_payload(reference: &str, concepts: &[String]) -> String {
    format!(
        "{}\n\nConcepts: {}",
        delimited("Chapter", reference),
        concepts.join("; ")
    )
}

pub const CREATE_OVERVIEW: &str = "\
You are a helpful computer science (CS) professor. Given the set of CS concepts, \
write a brief overview for a CS textbook chapter that covers these concepts. Include \
an h1 title for the chapter and at most 2 paragraphs of overview. Your output should \
be in markdown format.";

pub fn overview_payload(concepts: &[String]) -> String {
    format!("CS concepts: {}", concepts.join(", "))
}

pub fn personalize_concept(interest: &str, language: Option<&str>) -> String {
    let code = match language {
        Some(lang) => format!(
            " Feel free to include code snippets in {lang} to illustrate your explanations."
        ),
        None => String::new(),
    };
    format!(
        "You are an expert in computer science (CS) and {interest}. Explain the provided \
         CS concept in terms of {interest} concepts. Your explanation will be just one \
         subsection of a CS textbook chapter. Start with an h2 header naming the concept; \
         subheaders should be h3. Avoid numbering the headers and subheaders.{code}"
    )
}

pub fn concept_payload(concept: &str, layout: Option<&[String]>) -> String {
    match layout {
        Some(steps) if !steps.is_empty() => {
            let steps = steps
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "CS concept to teach: {concept}\n\nFollow this layout, in order:\n{steps}"
            )
        }
        _ => format!("CS concept to teach: {concept}"),
    }
}

pub fn create_analogy(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest}. Introduce the provided \
         CS concept to a student interested in {interest} through an analogy drawn from \
         {interest}. Do not generate headers. Do not generate code blocks."
    )
}

pub fn refine_subsection(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest} who is open to \
         feedback. You have previously crafted the provided CS textbook chapter subsection \
         for a friend who is interested in {interest}. Address the provided feedback to \
         improve the subsection. The improved subsection should be similar in structure \
         to the old subsection; your improvements do not need to drastically change it."
    )
}

/// Payload for any feedback-driven rewrite of one unit of text.
pub fn refine_payload(
    unit_label: &str,
    old: &str,
    feedback: &str,
    opponent_summary: Option<&str>,
) -> String {
    let mut payload = labelled_refine_payload(unit_label, old, "Feedback", feedback);
    if let Some(summary) = opponent_summary {
        payload.push_str("\n\n");
        payload.push_str(&delimited("Summary of a Competing Chapter", summary));
    }
    payload
}

/// Old section plus one persona's feedback, headed `"{persona} Feedback"`.
pub fn persona_refine_payload(old: &str, persona: &str, feedback: &str) -> String {
    labelled_refine_payload("Section", old, &format!("{persona} Feedback"), feedback)
}

fn labelled_refine_payload(unit_label: &str, old: &str, feedback_label: &str, feedback: &str) -> String {
    format!(
        "{}\n\n{}",
        delimited(&format!("Old {unit_label}"), old),
        delimited(feedback_label, feedback)
    )
}

// ── Structure personalizer ───────────────────────────────────────────────────

pub const EXTRACT_SECTIONS: &str = "\
You are a thoughtful computer science (CS) textbook author. Your task is to separate \
the sections within the provided CS textbook chapter that is written in Markdown. \
Each section is mutually exclusive to one another; one unique text block (e.g. header, \
paragraph, code block, etc.) must belong to one and only one section. Each section \
must contain two or more text blocks. Copy every block verbatim. Your output must \
contain all text blocks found in the chapter, in their original order.";

pub fn personalize_chapter(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest}. Your task is to modify \
         the explanations and examples in the provided CS textbook chapter (written in \
         Markdown) using {interest} concepts. Ensure the layout of your personalized chapter \
         exactly follows the layout of the original chapter. Do not leave out any \
         paragraph, code block, etc."
    )
}

pub fn personalize_section(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest}. Your task is to modify \
         the explanations and examples in the provided section of a CS textbook chapter \
         (written in Markdown) using {interest} concepts. Ensure the layout of your \
         personalized section exactly follows the layout of the original section. Do not \
         leave out any paragraph, code block, etc."
    )
}

pub fn refine_chapter(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest} who is open to \
         feedback. You have previously crafted the provided CS textbook chapter for a \
         friend who is interested in {interest}. Address the provided feedback to improve \
         the chapter. The improved chapter should be similar in structure to the old \
         chapter; your improvements do not need to drastically change it."
    )
}

pub fn refine_section(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest} who is open to \
         feedback. You have previously crafted the provided section of a CS textbook \
         chapter for a friend who is interested in {interest}. Address the provided \
         feedback where it applies to this section. Keep the layout of the section and \
         only make the changes the feedback calls for."
    )
}

pub fn refine_from_student(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest} who is receptive to \
         feedback. A student gave you feedback to improve the old CS textbook section. \
         Output the improved old section based on the feedback and only the feedback. \
         Only make minor edits."
    )
}

pub fn refine_from_expert(interest: &str) -> String {
    format!(
        "You are an expert in computer science (CS) and {interest} who is receptive to \
         feedback. Another expert gave you feedback to improve the old CS textbook section. \
         Output the improved old section based on the feedback and only the feedback. \
         Only make minor edits."
    )
}

// ── Judge ────────────────────────────────────────────────────────────────────

pub fn rubric_feedback(interest: &str, with_summary: bool) -> String {
    let categories = rubric_categories(interest)
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    let summary = if with_summary {
        " In your output, include a summary of what the AI assistant accomplished in making \
         the modified chapter, as well as what you like and dislike about the modified chapter."
    } else {
        ""
    };
    format!(
        "You are an expert in {interest} and computer science. Please act as an objective \
         judge and evaluate the quality of a modified computer science (CS) textbook chapter \
         outputted by an AI assistant, which explains CS concepts using {interest} concepts. \
         You will be given a reference textbook chapter that explains CS concepts without \
         modifications. Your task is to score the modified textbook on four categories on a \
         scale of 1 to 3, where 1 is unsatisfactory, 2 is semi-satisfactory, and 3 is \
         satisfactory. In your output, include the category, the score, and your \
         explanation for why you gave that score. The categories are:\n\n{categories}\n\n\
         Do not allow the length of the responses to influence your evaluation. Be as \
         objective as possible.{summary}"
    )
}

pub fn evaluation_payload(reference: &str, modified: &str) -> String {
    format!(
        "{}\n\n{}",
        delimited("Reference Chapter", reference),
        delimited("Modified Chapter", modified)
    )
}

pub fn student_feedback(interest: &str) -> String {
    format!(
        "You are a university student who loves {interest} but has never studied the \
         computer science (CS) topics in the provided chapter. Read the modified chapter, \
         which uses {interest} to teach CS, and give its author honest feedback: which \
         explanations confused you, where the {interest} examples helped or distracted, and \
         what you would need to understand the CS content on your own. Refer to specific \
         sections. Do not rewrite the chapter."
    )
}

pub fn expert_feedback(interest: &str) -> String {
    format!(
        "You are an expert in both computer science (CS) and {interest}. Compare the \
         modified chapter against the reference chapter and give its author feedback: \
         point out any CS content that is missing or inaccurate, any {interest} content \
         that is used incorrectly, and any place where {interest} overshadows the CS being \
         taught. Refer to specific sections. Do not rewrite the chapter."
    )
}

pub fn compare(interest: &str, first: &str, second: &str) -> String {
    format!(
        "Please act as an impartial judge and evaluate the quality of the modified computer \
         science (CS) textbook chapters outputted by two AI assistants. The chapters explain \
         CS concepts using {interest} concepts. Your evaluation is from the perspective of \
         someone who is interested in {interest} but is new to the CS concepts. Your job is \
         to evaluate which assistant's chapter is more effective for you to learn CS.\n\n\
         Avoid any position biases and ensure that the order in which the responses were \
         presented does not influence your decision. Do not allow the length of the \
         responses to influence your evaluation. Do not favor certain names of the \
         assistants. Be as objective as possible. After providing your explanation, output \
         your final verdict in the 'choice' field by strictly following this format: \
         '{first}' if assistant {first} is better, '{second}' if assistant {second} is \
         better, and 'TIE' for a tie. Include a brief explanation of your choice in the \
         output."
    )
}

pub fn compare_payload(first: &str, first_text: &str, second: &str, second_text: &str) -> String {
    format!(
        "{}\n\n{}",
        delimited(&format!("Assistant {first}'s Chapter"), first_text),
        delimited(&format!("Assistant {second}'s Chapter"), second_text)
    )
}
