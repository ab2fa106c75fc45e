use crate::email::NormalizedMessage;

pub const DEFAULT_TEMPLATE: &str = "You are an email assistant for {user_name}. Analyze this email and determine if it's important.

IMPORTANT emails include:
- Personal messages from family, friends, colleagues, or acquaintances
- Social invitations, party planning, or event coordination
- Financial/banking communications
- Bills, invoices, or payment notifications
- Appointment confirmations or scheduling
- Work-related communications
- Legal or official documents
- Any message that requires a response or action from {user_name}

NOT IMPORTANT emails include:
- Marketing/promotional emails from businesses
- Newsletters or automated updates
- Spam or advertisements
- Generic notifications from services

If the email is from someone {user_name} knows personally (family, friends, colleagues), it is almost always IMPORTANT.

If the email is NOT IMPORTANT, respond with exactly: NOT IMPORTANT

If the email IS IMPORTANT, respond with a brief 1-2 sentence summary of what {user_name} needs to know or do. Be direct and concise.

Email to analyze:
Subject: {subject}
From: {from}
Date: {date}
Body: {body}
";

/// Fills the template placeholders. Values are substituted in a single
/// pass, so braces inside the message never expand further.
pub fn render(template: &str, user_name: &str, message: &NormalizedMessage) -> String {
    let mut out = String::with_capacity(template.len() + message.body.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let replaced = after.find('}').and_then(|end| {
            let value = match &after[1..end] {
                "user_name" => user_name,
                "subject" => message.subject.as_str(),
                "from" => message.from_name.as_str(),
                "from_addr" => message.from_addr.as_str(),
                "date" => message.date.as_str(),
                "body" => message.body.as_str(),
                _ => return None,
            };
            Some((value, end + 1))
        });

        match replaced {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &after[consumed..];
            }
            None => {
                out.push('{');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NormalizedMessage {
        NormalizedMessage {
            uid: 1,
            subject: "Lunch {body}".to_string(),
            from_name: "Alice".to_string(),
            from_addr: "alice@example.com".to_string(),
            date: "Mon, 6 Oct 2025 10:00:00 +0000".to_string(),
            received_at: None,
            body: "Tomorrow at noon?".to_string(),
        }
    }

    #[test]
    fn test_default_template() {
        let prompt = render(DEFAULT_TEMPLATE, "Sam", &message());
        assert!(prompt.starts_with("You are an email assistant for Sam."));
        assert!(prompt.contains("action from Sam\n"));
        assert!(prompt.contains("From: Alice\n"));
        assert!(prompt.contains("Body: Tomorrow at noon?\n"));
        // Placeholders inside values are left alone
        assert!(prompt.contains("Subject: Lunch {body}\n"));
    }

    #[test]
    fn test_unknown_placeholders_kept() {
        let prompt = render("{from_addr} {unknown} {", "Sam", &message());
        assert_eq!(prompt, "alice@example.com {unknown} {");
    }
}
