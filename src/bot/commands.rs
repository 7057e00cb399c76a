// src/bot/commands.rs — Slash commands and callback payloads
//
// Callback data is what the inline keyboards carry back, e.g. `cat:12345`,
// `attr:condition:used` or `bulk:edit:3:price`.

use crate::bulk::{DraftId, EditField};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    New,
    Bulk,
    Cancel,
    Login,
    Logout,
    Status,
    Listings,
    /// `/template` with no argument shows the current template; `off`
    /// clears it.
    Template(Option<String>),
    Postal(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse `/name args`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        // "/start@my_bot" in group chats
        let name = name.split('@').next().unwrap_or(name).to_lowercase();
        let arg = (!args.is_empty()).then(|| args.to_string());

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "new" => Command::New,
            "bulk" => Command::Bulk,
            "cancel" => Command::Cancel,
            "login" => Command::Login,
            "logout" => Command::Logout,
            "status" => Command::Status,
            "listings" => Command::Listings,
            "template" => Command::Template(arg),
            "postal" => Command::Postal(arg),
            _ => Command::Unknown(name),
        })
    }
}

pub const HELP_TEXT: &str = "\
Send me photos of something you want to sell and I will draft the listing.

/new - start a single listing
/bulk - list many items at once (one album per item)
/cancel - abandon whatever is in progress
/login - connect your marketplace account
/logout - forget your marketplace login
/status - what I am working on
/listings - your live listings
/template <text> - text appended to every description (/template off to clear)
/postal <code> - default postal code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    Delete(DraftId),
    Edit(DraftId, EditField),
    Category(DraftId, String),
    Publish(DraftId),
    PublishAll,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Category(String),
    /// Open a node of the category tree; `None` shows the roots.
    Browse(Option<usize>),
    Attribute { field: String, value: String },
    Shipping(bool),
    PackageSize(String),
    Confirm,
    Cancel,
    Recategorize,
    Page(usize),
    Bulk(BulkAction),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(2, ':');
        let head = parts.next()?;
        let rest = parts.next();

        match (head, rest) {
            ("cat", Some(id)) if !id.is_empty() => Some(Self::Category(id.to_string())),
            ("browse", Some("root")) => Some(Self::Browse(None)),
            ("browse", Some(idx)) => idx.parse().ok().map(|i| Self::Browse(Some(i))),
            ("attr", Some(rest)) => {
                let (field, value) = rest.split_once(':')?;
                Some(Self::Attribute {
                    field: field.to_string(),
                    value: value.to_string(),
                })
            }
            ("ship", Some("yes")) => Some(Self::Shipping(true)),
            ("ship", Some("no")) => Some(Self::Shipping(false)),
            ("pkg", Some(id)) if !id.is_empty() => Some(Self::PackageSize(id.to_string())),
            ("confirm", None) => Some(Self::Confirm),
            ("cancel", None) => Some(Self::Cancel),
            ("recat", None) => Some(Self::Recategorize),
            ("page", Some(n)) => n.parse().ok().map(Self::Page),
            ("bulk", Some(rest)) => parse_bulk(rest).map(Self::Bulk),
            _ => None,
        }
    }
}

fn parse_bulk(rest: &str) -> Option<BulkAction> {
    let parts: Vec<&str> = rest.splitn(3, ':').collect();
    match parts.as_slice() {
        ["del", id] => Some(BulkAction::Delete(id.parse().ok()?)),
        ["edit", id, field] => Some(BulkAction::Edit(id.parse().ok()?, EditField::parse(field)?)),
        ["cat", id, category] if !category.is_empty() => {
            Some(BulkAction::Category(id.parse().ok()?, category.to_string()))
        }
        ["pub", id] => Some(BulkAction::Publish(id.parse().ok()?)),
        ["puball"] => Some(BulkAction::PublishAll),
        ["cancel"] => Some(BulkAction::Cancel),
        _ => None,
    }
}

/// Callback payload builders, kept next to the parser.
pub mod data {
    use crate::bulk::{DraftId, EditField};

    pub fn category(id: &str) -> String {
        format!("cat:{id}")
    }

    pub fn browse(node: Option<usize>) -> String {
        match node {
            Some(i) => format!("browse:{i}"),
            None => "browse:root".into(),
        }
    }

    pub fn attribute(field: &str, value: &str) -> String {
        format!("attr:{field}:{value}")
    }

    pub fn shipping(yes: bool) -> String {
        format!("ship:{}", if yes { "yes" } else { "no" })
    }

    pub fn package(id: &str) -> String {
        format!("pkg:{id}")
    }

    pub fn page(n: usize) -> String {
        format!("page:{n}")
    }

    pub fn bulk_delete(id: DraftId) -> String {
        format!("bulk:del:{id}")
    }

    pub fn bulk_edit(id: DraftId, field: EditField) -> String {
        format!("bulk:edit:{id}:{}", field.as_str())
    }

    pub fn bulk_category(id: DraftId, category: &str) -> String {
        format!("bulk:cat:{id}:{category}")
    }

    pub fn bulk_publish(id: DraftId) -> String {
        format!("bulk:pub:{id}")
    }

    pub const CONFIRM: &str = "confirm";
    pub const CANCEL: &str = "cancel";
    pub const RECATEGORIZE: &str = "recat";
    pub const BULK_PUBLISH_ALL: &str = "bulk:puball";
    pub const BULK_CANCEL: &str = "bulk:cancel";
}
