// Prompt text for grading an idea against a case study.
//
// The model is asked for a bare JSON object with one sub-score per criterion;
// the overall score is their sum, computed on our side.

/// Static system prompt for every grading call.
pub fn system_prompt() -> String {
    "You are the judge of a business-ideas cricket league. Teams bowl short \
     ideas at a case study and you score each one.\n\
     \n\
     Score four criteria, each from 0 to 25:\n\
     - relevance: does the idea address the problem actually stated in the case?\n\
     - originality: is it more than the obvious first answer?\n\
     - feasibility: could a small team start on it within a month?\n\
     - impact: how much of the stated problem would it move if it worked?\n\
     \n\
     Be strict. Vague, generic or off-topic ideas should score low on every \
     criterion. Length is not merit.\n\
     \n\
     Reply with ONLY a JSON object, no prose and no code fence, shaped like:\n\
     {\"relevance\": 0-25, \"originality\": 0-25, \"feasibility\": 0-25, \
     \"impact\": 0-25, \"rationale\": \"one or two sentences\", \
     \"strengths\": [\"...\"], \"improvements\": [\"...\"]}"
        .to_string()
}

/// The user turn: the case statement followed by the submitted idea.
pub fn build_grading_prompt(case_statement: &str, content: &str) -> String {
    let case_statement = case_statement.trim();
    let case = if case_statement.is_empty() {
        "(no case study assigned; judge the idea on its own merits)"
    } else {
        case_statement
    };
    format!(
        "## Case study\n{case}\n\n## Submitted idea\n{}\n\nScore the idea.",
        content.trim()
    )
}
