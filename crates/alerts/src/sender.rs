//! Who wrote the last message of an open-lines dialog.

use std::collections::HashMap;

use {
    replywatch_bitrix::{DialogMessage, DialogUser},
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastSender {
    /// A portal employee, bot or the system replied last.
    Operator,
    /// The customer wrote last.
    Client,
    Unknown,
}

/// Classify the author of a dialog message.
///
/// Portals disagree on which fields they fill, so the rules are tried in
/// order and the first one that matches wins:
///
/// 1. `author_type` of `operator`, `bot` or `system`.
/// 2. `source` / `user_source` of `client`, `external` or `guest`.
/// 3. `author_id`: `0` is the customer side of a connector; a participant
///    flagged as `connector` or `extranet` is a customer; any other id is an
///    internal user.
#[must_use]
pub fn classify_last_sender(
    message: &DialogMessage,
    users: &HashMap<i64, DialogUser>,
) -> LastSender {
    let lower = |v: Option<&str>| v.map(str::to_lowercase).unwrap_or_default();

    let author_type = lower(message.author_type.as_deref());
    if matches!(author_type.as_str(), "operator" | "bot" | "system") {
        return LastSender::Operator;
    }

    let source = lower(message.source.as_deref().or(message.user_source.as_deref()));
    if matches!(source.as_str(), "client" | "external" | "guest") {
        return LastSender::Client;
    }

    match message.author_id {
        Some(0) => LastSender::Client,
        Some(id) => match users.get(&id) {
            Some(user) if user.connector || user.extranet => LastSender::Client,
            _ => LastSender::Operator,
        },
        None => LastSender::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn msg(author_id: Option<i64>, author_type: Option<&str>, source: Option<&str>) -> DialogMessage {
        DialogMessage {
            author_id,
            author_type: author_type.map(String::from),
            source: source.map(String::from),
            ..Default::default()
        }
    }

    fn users() -> HashMap<i64, DialogUser> {
        [
            DialogUser {
                id: 12,
                name: Some("Anna".into()),
                ..Default::default()
            },
            DialogUser {
                id: 40,
                name: Some("WhatsApp client".into()),
                connector: true,
                ..Default::default()
            },
            DialogUser {
                id: 41,
                extranet: true,
                ..Default::default()
            },
        ]
        .into_iter()
        .map(|u| (u.id, u))
        .collect()
    }

    #[rstest]
    #[case(msg(Some(40), Some("Operator"), None), LastSender::Operator)]
    #[case(msg(None, Some("bot"), None), LastSender::Operator)]
    #[case(msg(Some(12), None, Some("client")), LastSender::Client)]
    #[case(msg(None, None, Some("GUEST")), LastSender::Client)]
    #[case(msg(Some(0), None, None), LastSender::Client)]
    #[case(msg(Some(40), None, None), LastSender::Client)]
    #[case(msg(Some(41), None, None), LastSender::Client)]
    #[case(msg(Some(12), None, None), LastSender::Operator)]
    #[case(msg(Some(999), None, None), LastSender::Operator)]
    #[case(msg(None, None, None), LastSender::Unknown)]
    #[case(msg(None, Some("user"), Some("portal")), LastSender::Unknown)]
    fn last_sender_rules(#[case] message: DialogMessage, #[case] expected: LastSender) {
        assert_eq!(classify_last_sender(&message, &users()), expected);
    }

    #[test]
    fn user_source_is_consulted_when_source_is_missing() {
        let message = DialogMessage {
            author_id: Some(12),
            user_source: Some("external".into()),
            ..Default::default()
        };
        assert_eq!(classify_last_sender(&message, &users()), LastSender::Client);
    }
}
