// src/bot/render.rs — Message text and keyboards

use crate::bulk::{AnalysisStatus, BulkDraft, BulkSession, EditField, TradeType};
use crate::flow::input::format_price;
use crate::flow::{CategoryTree, Draft, FlowState, NodeId};
use crate::integrations::types::{CategoryPrediction, Keyboard, ListingSummary};
use crate::util::ellipsize;

use super::commands::data;

const MAX_PREDICTIONS: usize = 6;

/// Prompt for the draft's current state. `None` for states without one.
pub fn draft_prompt(draft: &Draft, tree: &CategoryTree) -> Option<(String, Keyboard)> {
    match draft.state() {
        FlowState::None => None,
        FlowState::AwaitingCategory => Some(category_prompt(draft, tree)),
        FlowState::AwaitingAttribute { field_id } => {
            let field = draft.fields.field(field_id)?;
            if field.options.is_empty() {
                Some((
                    format!("{}? Type your answer.", field.label),
                    cancel_only(),
                ))
            } else {
                let kb = field
                    .options
                    .chunks(3)
                    .fold(Keyboard::new(), |kb, chunk| {
                        kb.row(chunk.iter().map(|o| {
                            (o.label.clone(), data::attribute(&field.id, &o.id))
                        }))
                    })
                    .button("Cancel", data::CANCEL);
                Some((format!("{}?", field.label), kb))
            }
        }
        FlowState::AwaitingPrice => Some((
            "What price are you asking? (e.g. 50€, or 0 to give it away)".into(),
            cancel_only(),
        )),
        FlowState::AwaitingShipping => Some((
            "Do you want to offer shipping?".into(),
            Keyboard::new()
                .row([("Yes", data::shipping(true)), ("No", data::shipping(false))])
                .button("Cancel", data::CANCEL),
        )),
        FlowState::AwaitingPackageSize => Some((
            "How big is the package?".into(),
            draft
                .fields
                .package_sizes
                .iter()
                .fold(Keyboard::new(), |kb, p| kb.button(p.label.clone(), data::package(&p.id)))
                .button("Cancel", data::CANCEL),
        )),
        FlowState::AwaitingPostalCode => Some((
            "What postal code is the item at? (5 digits)".into(),
            cancel_only(),
        )),
        FlowState::ReadyToPublish => Some(ready_message(draft, tree)),
    }
}

fn cancel_only() -> Keyboard {
    Keyboard::new().button("Cancel", data::CANCEL)
}

fn category_prompt(draft: &Draft, tree: &CategoryTree) -> (String, Keyboard) {
    let mut text = format!("📦 {}\n\nWhich category fits best?", draft.title);
    if draft.predictions.is_empty() {
        text.push_str("\nI have no suggestions; browse the categories below.");
    }
    let kb = prediction_rows(&draft.predictions, tree, |p| data::category(&p.category_id))
        .button("Browse all categories", data::browse(None))
        .button("Cancel", data::CANCEL);
    (text, kb)
}

fn prediction_rows(
    predictions: &[CategoryPrediction],
    tree: &CategoryTree,
    payload: impl Fn(&CategoryPrediction) -> String,
) -> Keyboard {
    predictions
        .iter()
        .take(MAX_PREDICTIONS)
        .fold(Keyboard::new(), |kb, p| {
            let label = tree
                .path_label(&p.category_id)
                .unwrap_or_else(|| p.name.clone());
            kb.button(label, payload(p))
        })
}

/// One level of the category tree. Leaves select, inner nodes descend.
pub fn browse_keyboard(tree: &CategoryTree, node: Option<NodeId>) -> (String, Keyboard) {
    let children = match node {
        Some(id) => tree.children(id),
        None => tree.roots(),
    };
    let title = node
        .and_then(|id| tree.node(id))
        .and_then(|n| tree.path_label(&n.id))
        .unwrap_or_else(|| "All categories".into());

    let mut kb = children.iter().fold(Keyboard::new(), |kb, &child| {
        let Some(n) = tree.node(child) else {
            return kb;
        };
        let payload = if tree.is_leaf(child) {
            data::category(&n.id)
        } else {
            data::browse(Some(child.index()))
        };
        kb.button(n.name.clone(), payload)
    });
    if let Some(parent) = node.and_then(|id| tree.node(id)).map(|n| n.parent) {
        kb = kb.button("⬅ Back", data::browse(parent.map(NodeId::index)));
    }
    (title, kb.button("Cancel", data::CANCEL))
}

/// Summary shown once everything is collected.
pub fn ready_message(draft: &Draft, tree: &CategoryTree) -> (String, Keyboard) {
    let mut lines = vec![format!("✅ Ready to publish: {}", draft.title)];
    if let Some(cat) = &draft.category {
        let label = tree.path_label(&cat.id).unwrap_or_else(|| cat.name.clone());
        lines.push(format!("Category: {label}"));
    }
    for field in &draft.fields.fields {
        if let Some(value) = draft.attributes.get(&field.id) {
            let shown = field.option_label(value).unwrap_or(value);
            lines.push(format!("{}: {}", field.label, shown));
        }
    }
    match draft.price {
        Some(p) if p == 0.0 => lines.push("Price: free (giveaway)".into()),
        Some(p) => lines.push(format!("Price: {}", format_price(p))),
        None => {}
    }
    let shipping = match (draft.shipping, &draft.package_size) {
        (Some(true), Some(size)) => format!("Shipping: yes ({size})"),
        (Some(true), None) => "Shipping: yes".into(),
        _ => "Shipping: pickup only".into(),
    };
    lines.push(shipping);
    if let Some(code) = &draft.postal_code {
        lines.push(format!("Postal code: {code}"));
    }
    lines.push(String::new());
    lines.push(ellipsize(&draft.description, 600));
    lines.push(String::new());
    lines.push("Reply with a change (\"make it 40€\") or confirm.".into());

    let kb = Keyboard::new()
        .button("🚀 Publish", data::CONFIRM)
        .row([
            ("Change category", data::RECATEGORIZE),
            ("Cancel", data::CANCEL),
        ]);
    (lines.join("\n"), kb)
}

fn status_icon(draft: &BulkDraft) -> &'static str {
    match draft.status {
        AnalysisStatus::Pending => "⏳",
        AnalysisStatus::Analyzing => "🔍",
        AnalysisStatus::Error => "⚠️",
        AnalysisStatus::Done if draft.publishing => "📤",
        AnalysisStatus::Done if draft.is_ready() => "✅",
        AnalysisStatus::Done => "✏️",
    }
}

/// The single status message of a bulk session.
pub fn bulk_status(bulk: &BulkSession, tree: &CategoryTree) -> (String, Keyboard) {
    let counts = bulk.counts();
    let mut lines = vec![format!(
        "Bulk listing: {} item(s), {} ready, {} analysing, {} failed",
        counts.total,
        counts.ready,
        counts.analyzing + counts.pending,
        counts.failed
    )];
    if bulk.is_empty() {
        lines.push("Send photos; each album becomes one listing.".into());
    }

    let mut kb = Keyboard::new();
    for draft in bulk.drafts() {
        let n = draft.index + 1;
        let detail = match draft.status {
            AnalysisStatus::Pending | AnalysisStatus::Analyzing => "analysing…".to_string(),
            AnalysisStatus::Error => draft
                .error
                .clone()
                .unwrap_or_else(|| "analysis failed".into()),
            AnalysisStatus::Done => {
                let price = match draft.trade_type {
                    TradeType::Giveaway => "free".to_string(),
                    TradeType::Sell if draft.price > 0.0 => format_price(draft.price),
                    TradeType::Sell => "no price".to_string(),
                };
                let category = draft
                    .category
                    .as_ref()
                    .map(|c| tree.path_label(&c.id).unwrap_or_else(|| c.name.clone()))
                    .unwrap_or_else(|| "no category".into());
                format!("{} · {} · {}", ellipsize(&draft.title, 40), price, category)
            }
        };
        lines.push(format!("{} #{} {}", status_icon(draft), n, detail));

        if draft.status == AnalysisStatus::Done && !draft.publishing {
            kb = kb.row([
                (format!("#{n} Title"), data::bulk_edit(draft.id, EditField::Title)),
                (format!("#{n} Desc"), data::bulk_edit(draft.id, EditField::Description)),
                (format!("#{n} Price"), data::bulk_edit(draft.id, EditField::Price)),
            ]);
            kb = kb.row([
                (format!("#{n} Category"), data::bulk_edit(draft.id, EditField::Category)),
                (format!("#{n} Shipping"), data::bulk_edit(draft.id, EditField::Shipping)),
            ]);
        }
        if !draft.publishing {
            let mut actions = vec![(format!("🗑 #{n}"), data::bulk_delete(draft.id))];
            if draft.is_ready() {
                actions.push((format!("🚀 #{n}"), data::bulk_publish(draft.id)));
            }
            kb = kb.row(actions);
        }
    }

    if counts.ready > 0 {
        kb = kb.button(format!("🚀 Publish all ready ({})", counts.ready), data::BULK_PUBLISH_ALL);
    }
    kb = kb.button("Cancel bulk session", data::BULK_CANCEL);
    (lines.join("\n"), kb)
}

pub fn bulk_category_prompt(draft: &BulkDraft, tree: &CategoryTree) -> (String, Keyboard) {
    let id = draft.id;
    let kb = prediction_rows(&draft.predictions, tree, |p| {
        data::bulk_category(id, &p.category_id)
    });
    let text = if draft.predictions.is_empty() {
        format!("#{}: no category suggestions, send the category id.", draft.index + 1)
    } else {
        format!("#{}: pick a category", draft.index + 1)
    };
    (text, kb)
}

pub fn bulk_edit_prompt(draft: &BulkDraft, field: EditField) -> String {
    let n = draft.index + 1;
    match field {
        EditField::Title => format!("Send the new title for #{n}"),
        EditField::Description => format!("Send the new description for #{n}"),
        EditField::Price => format!("Send the price for #{n} (0 to give it away)"),
        EditField::Shipping => format!("Offer shipping for #{n}? (yes/no)"),
        EditField::Category => format!("Pick a category for #{n}"),
    }
}

pub fn listings_page(items: &[ListingSummary], page: usize, has_next: bool) -> (String, Keyboard) {
    let mut lines = vec![format!("Your listings (page {})", page + 1)];
    if items.is_empty() {
        lines.push("Nothing here.".into());
    }
    for item in items {
        lines.push(format!(
            "• {} · {} · {}",
            ellipsize(&item.title, 50),
            format_price(item.price),
            item.status
        ));
    }
    let mut nav = Vec::new();
    if page > 0 {
        nav.push(("⬅ Prev".to_string(), data::page(page - 1)));
    }
    if has_next {
        nav.push(("Next ➡".to_string(), data::page(page + 1)));
    }
    (lines.join("\n"), Keyboard::new().row(nav))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::SelectedCategory;
    use crate::integrations::types::{CategoryEntry, CategoryFields, PhotoRef, RemoteDraft};
    use std::collections::BTreeMap;

    fn tree() -> CategoryTree {
        CategoryTree::from_entries(&[
            CategoryEntry {
                id: "100".into(),
                name: "Home".into(),
                parent_id: None,
            },
            CategoryEntry {
                id: "111".into(),
                name: "Chairs".into(),
                parent_id: Some("100".into()),
            },
        ])
    }

    #[test]
    fn test_browse_roots_then_leaf() {
        let tree = tree();
        let (title, kb) = browse_keyboard(&tree, None);
        assert_eq!(title, "All categories");
        assert_eq!(kb.rows[0][0].data, "browse:0");

        let home = tree.lookup("100");
        let (title, kb) = browse_keyboard(&tree, home);
        assert_eq!(title, "Home");
        assert_eq!(kb.rows[0][0].data, "cat:111");
        assert_eq!(kb.rows[1][0].data, "browse:root");
    }

    #[test]
    fn test_ready_message_mentions_giveaway() {
        let tree = tree();
        let mut draft = Draft::new(
            RemoteDraft {
                id: "d".into(),
                etag: "e".into(),
            },
            "Chair".into(),
            "Nice chair".into(),
            vec![],
            Some("28001".into()),
        );
        draft
            .select_category(
                SelectedCategory {
                    id: "111".into(),
                    name: "Chairs".into(),
                },
                CategoryFields::default(),
                &BTreeMap::new(),
            )
            .unwrap();
        draft.answer_price("0").unwrap();

        let (text, kb) = draft_prompt(&draft, &tree).unwrap();
        assert!(text.contains("Home › Chairs"));
        assert!(text.contains("giveaway"));
        assert_eq!(kb.rows[0][0].data, "confirm");
    }

    #[test]
    fn test_bulk_status_lists_drafts_in_display_order() {
        let mut bulk = BulkSession::new();
        let a = bulk.add_draft(vec![PhotoRef {
            file_id: "a".into(),
        }]);
        bulk.add_draft(vec![PhotoRef {
            file_id: "b".into(),
        }]);
        bulk.delete(a);

        let (text, kb) = bulk_status(&bulk, &tree());
        assert!(text.contains("1 item(s)"));
        assert!(text.contains("#1 analysing"));
        assert!(kb.rows.iter().flatten().any(|b| b.data == "bulk:cancel"));
    }

    #[test]
    fn test_listings_navigation() {
        let (_, kb) = listings_page(&[], 0, true);
        assert_eq!(kb.rows[0].len(), 1);
        assert_eq!(kb.rows[0][0].data, "page:1");
        let (_, kb) = listings_page(&[], 1, false);
        assert_eq!(kb.rows[0][0].data, "page:0");
    }
}
