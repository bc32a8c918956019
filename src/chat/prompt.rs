/// Persona preamble and closing instruction around the policy text. The
/// suffix is what keeps the model answering from the policies alone.
pub const SYSTEM_PREAMBLE: &str =
    "You are ACME Telecom's virtual assistant. Answer strictly based on the following monitoring policies:\n\n";
pub const SYSTEM_SUFFIX: &str = "\n\nOnly respond with the approved policy information.";

pub fn build_system_prompt(policies_text: &str) -> String {
    format!("{SYSTEM_PREAMBLE}{policies_text}{SYSTEM_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_wraps_policy_text() {
        let prompt = build_system_prompt("Retain logs for 30 days.");
        assert!(prompt.starts_with(SYSTEM_PREAMBLE));
        assert!(prompt.ends_with(SYSTEM_SUFFIX));
        let body_start = SYSTEM_PREAMBLE.len();
        let body_end = prompt.len() - SYSTEM_SUFFIX.len();
        assert_eq!(&prompt[body_start..body_end], "Retain logs for 30 days.");
    }
}
