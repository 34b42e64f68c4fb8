//! Classification prompt construction.
//!
//! Pure functions of the message: same message, same prompt.

use crate::pipeline::types::Message;

/// System message sent with every classification request.
pub const SYSTEM_PROMPT: &str = "You are an expert email classifier for job applications. \
                                 Respond only with the exact format requested.";

/// Category definitions and the hard-case rule.
const CATEGORY_DEFINITIONS: &str = "\
You are an expert email classifier specializing in job application emails. Your task is to classify emails into exactly one of these three categories:

1. **application_submitted** - Confirmation emails after submitting job applications
2. **followup_required** - Important emails requiring immediate action (interviews, document requests, offers)
3. **other** - All other emails (marketing, job alerts, newsletters, GitHub notifications, non-job related)

**IMPORTANT**: Job alert emails, marketing emails from job sites, and promotional content should ALWAYS be classified as \"other\" even if they mention jobs.
";

/// Worked examples covering job alerts vs confirmations vs interview requests.
const WORKED_EXAMPLES: &str = "\
**Examples:**

Example 1:
Subject: \"Just in: Comresource has new Senior Machine Learning Engineer jobs open\"
Sender: lensa.com
CLASSIFICATION: other
REASON: Job alert/marketing email, not an application confirmation

Example 2:
Subject: \"software engineer\": Morningstar - Software Engineer and more
Sender: linkedin.com
CLASSIFICATION: other
REASON: LinkedIn job alert, promotional content

Example 3:
Subject: Re: [username/repo] Pull Request #7
Sender: github.com
CLASSIFICATION: other
REASON: GitHub notification, not job-related

Example 4:
Subject: Thank you for your application - Software Engineer Position
Sender: hr@techcompany.com
CLASSIFICATION: application_submitted
REASON: Direct application confirmation from company HR

Example 5:
Subject: Interview Invitation - Next Steps for Software Engineer Role
Sender: recruiter@company.com
CLASSIFICATION: followup_required
REASON: Interview invitation requiring immediate response

Example 6:
Subject: Thank you for your interest in our Software Engineer opening at Podium
Sender: no-reply@us.greenhouse-mail.io
Body: Unfortunately, the decision has been made to hold on filling the position for the time being
CLASSIFICATION: other
REASON: Job rejection email, no action needed

Example 7:
Subject: Sai, your application was sent to Theoris
Sender: jobs-noreply@linkedin.com
CLASSIFICATION: application_submitted
REASON: Application confirmation - application was sent/submitted

Example 8:
Subject: Your recent job application for Analyst - 244748
Sender: hdow.fa.sender@workflow.email.us-ashburn-1.ocs.oraclecloud.com
Body: Thank you for taking the time to apply for a position for Analyst at Newmark. We are now reviewing your application
CLASSIFICATION: application_submitted
REASON: Application confirmation - company acknowledging receipt and reviewing application
";

const CLASSIFICATION_RULES: &str = "\
**Key Classification Rules:**
- Job alerts from job sites (LinkedIn, Indeed, Lensa, etc.) = other
- Marketing emails with job listings = other
- GitHub/code repository notifications = other
- Newsletter/promotional content = other
- jobalerts-noreply@linkedin.com = other (job alerts/marketing)
- jobs-noreply@linkedin.com = application_submitted (application confirmation)
- Only classify as \"application_submitted\" if it's a direct confirmation from a company you applied to
- Only classify as \"followup_required\" if it requires immediate action (interview, documents, offer)
- \"is for\" in subject typically means application_submitted (e.g., \"Your application is for Software Engineer\")
";

/// Line prefixes the model is asked to answer with.
pub const CLASSIFICATION_MARKER: &str = "CLASSIFICATION:";
pub const CONFIDENCE_MARKER: &str = "CONFIDENCE:";
pub const REASON_MARKER: &str = "REASON:";

/// Build the user prompt for one message, embedding at most
/// `body_char_limit` characters of the body.
pub fn build_classification_prompt(message: &Message, body_char_limit: usize) -> String {
    let body: String = message.body.chars().take(body_char_limit).collect();

    let mut prompt = String::with_capacity(
        CATEGORY_DEFINITIONS.len() + WORKED_EXAMPLES.len() + CLASSIFICATION_RULES.len() + 512,
    );
    prompt.push_str(CATEGORY_DEFINITIONS);
    prompt.push('\n');
    prompt.push_str(WORKED_EXAMPLES);
    prompt.push('\n');

    prompt.push_str("**Now classify this email:**\n");
    prompt.push_str(&format!("- Subject: {}\n", message.subject));
    prompt.push_str(&format!("- Sender: {}\n", message.sender));
    prompt.push_str(&format!("- Preview: {}\n", message.snippet));
    prompt.push_str(&format!("- Body: {}\n\n", body));

    prompt.push_str(CLASSIFICATION_RULES);
    prompt.push('\n');

    prompt.push_str("Respond exactly as:\n");
    prompt.push_str(&format!("{CLASSIFICATION_MARKER} [category]\n"));
    prompt.push_str(&format!("{CONFIDENCE_MARKER} [0.0-1.0]\n"));
    prompt.push_str(&format!("{REASON_MARKER} [brief explanation]\n"));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            id: "m-1".into(),
            subject: "Interview Invitation - Next Steps".into(),
            sender: "recruiter@company.com".into(),
            date: "Tue, 14 Oct 2025 09:00:00 +0000".into(),
            snippet: "We would like to schedule".into(),
            body: "Please pick a time slot for a call.".into(),
        }
    }

    #[test]
    fn prompt_embeds_message_fields() {
        let prompt = build_classification_prompt(&message(), 1000);
        assert!(prompt.contains("- Subject: Interview Invitation - Next Steps"));
        assert!(prompt.contains("- Sender: recruiter@company.com"));
        assert!(prompt.contains("- Preview: We would like to schedule"));
        assert!(prompt.contains("- Body: Please pick a time slot"));
    }

    #[test]
    fn prompt_defines_all_categories() {
        let prompt = build_classification_prompt(&message(), 1000);
        assert!(prompt.contains("**application_submitted**"));
        assert!(prompt.contains("**followup_required**"));
        assert!(prompt.contains("**other**"));
    }

    #[test]
    fn prompt_contains_worked_examples_and_format() {
        let prompt = build_classification_prompt(&message(), 1000);
        for i in 1..=8 {
            assert!(prompt.contains(&format!("Example {i}:")), "missing example {i}");
        }
        assert!(prompt.contains("jobalerts-noreply@linkedin.com = other"));
        assert!(prompt.ends_with(
            "CLASSIFICATION: [category]\nCONFIDENCE: [0.0-1.0]\nREASON: [brief explanation]\n"
        ));
    }

    #[test]
    fn prompt_truncates_body_by_characters() {
        let mut msg = message();
        msg.body = "é".repeat(1500);
        let prompt = build_classification_prompt(&msg, 1000);
        let body_line = prompt
            .lines()
            .find(|l| l.starts_with("- Body: "))
            .unwrap();
        assert_eq!(body_line.trim_start_matches("- Body: ").chars().count(), 1000);
    }

    #[test]
    fn prompt_is_deterministic() {
        let a = build_classification_prompt(&message(), 1000);
        let b = build_classification_prompt(&message(), 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn snippet_is_not_truncated_by_body_limit() {
        let mut msg = message();
        msg.body = "x".repeat(10);
        let prompt = build_classification_prompt(&msg, 3);
        assert!(prompt.contains("- Body: xxx\n"));
        assert!(prompt.contains("- Preview: We would like to schedule"));
    }
}
