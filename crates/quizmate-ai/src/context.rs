//! Prompt assembly: question context and the `[system, user]` message pair

use crate::types::{DisclosurePolicy, Message, Question};

/// Instruction every system message starts with
pub const SYSTEM_INSTRUCTION: &str = "You are a professional programming tutor. \
The user will ask you about a programming quiz question.";

/// Separator between the values of a multi-answer question
pub const ANSWER_DELIMITER: &str = ", ";

/// Context from a bare title and body, with nothing disclosed
pub fn build_basic_context(title: &str, content: &str) -> String {
    format!("Title: {title}\nContent: {content}")
}

/// Context for a full question. The correct answer and explanation are only
/// included when `policy` discloses them for this submission state.
pub fn build_context(question: &Question, is_submitted: bool, policy: DisclosurePolicy) -> String {
    let mut context = build_basic_context(&question.title, &question.content);

    if !question.options.is_empty() {
        context.push_str("\nOptions:");
        for (index, option) in question.options.iter().enumerate() {
            context.push_str(&format!("\n{}. {option}", option_label(index)));
        }
    }

    if policy.discloses(is_submitted) {
        context.push_str("\nCorrect answer: ");
        context.push_str(&question.correct_answer.join(ANSWER_DELIMITER));

        if let Some(explanation) = question.explanation.as_deref().filter(|e| !e.is_empty()) {
            context.push_str("\nExplanation: ");
            context.push_str(explanation);
        }
    }

    context
}

/// Letter label of the option at `index`: `A`..`Z`, then `AA`, `AB`, ...
fn option_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        label.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    label.into_iter().rev().collect()
}

/// Build the two-message conversation sent to every provider
pub fn build_messages(user_question: &str, context: Option<&str>) -> Vec<Message> {
    let system = match context.filter(|c| !c.is_empty()) {
        Some(context) => format!("{SYSTEM_INSTRUCTION} Question details: {context}"),
        None => SYSTEM_INSTRUCTION.to_string(),
    };

    vec![Message::system(system), Message::user(user_question)]
}
