// src/flow/draft.rs — Single-listing draft state machine
//
// The draft always awaits exactly one thing. After every answer `advance`
// recomputes the first unresolved step in flow order, so preserved or
// auto-filled values skip their questions naturally.

use std::collections::BTreeMap;

use thiserror::Error;

use super::input;
use crate::infra::errors::InputError;
use crate::integrations::types::{
    CategoryFields, CategoryPrediction, DeliveryOptions, EditIntent, FieldPatch, MessageId,
    RemoteDraft,
};
use crate::timer::ExpiryTimer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    None,
    AwaitingCategory,
    AwaitingAttribute { field_id: String },
    AwaitingPrice,
    AwaitingShipping,
    AwaitingPackageSize,
    AwaitingPostalCode,
    ReadyToPublish,
}

impl FlowState {
    pub fn is_awaiting(&self) -> bool {
        !matches!(self, FlowState::None | FlowState::ReadyToPublish)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowState::None => "none",
            FlowState::AwaitingCategory => "awaiting_category",
            FlowState::AwaitingAttribute { .. } => "awaiting_attribute",
            FlowState::AwaitingPrice => "awaiting_price",
            FlowState::AwaitingShipping => "awaiting_shipping",
            FlowState::AwaitingPackageSize => "awaiting_package_size",
            FlowState::AwaitingPostalCode => "awaiting_postal_code",
            FlowState::ReadyToPublish => "ready_to_publish",
        }
    }
}

/// Values stashed when the user picks a different category, restored when
/// the new category can take them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreservedValues {
    pub price: Option<f64>,
    pub shipping: Option<bool>,
    pub package_size: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("The draft is not waiting for that right now")]
    OutOfOrder,
}

#[derive(Debug)]
pub struct Draft {
    state: FlowState,
    pub remote: RemoteDraft,
    pub title: String,
    pub description: String,
    pub predictions: Vec<CategoryPrediction>,
    pub category: Option<SelectedCategory>,
    pub fields: CategoryFields,
    pub attributes: BTreeMap<String, String>,
    pub price: Option<f64>,
    pub shipping: Option<bool>,
    pub package_size: Option<String>,
    pub postal_code: Option<String>,
    pub preserved: Option<PreservedValues>,
    /// Latest "ready" message; confirm/cancel on any other id is stale.
    pub confirmation_message_id: Option<MessageId>,
    pub publishing: bool,
    pub image_count: usize,
    pub expiry: ExpiryTimer,
}

impl Draft {
    /// A freshly created remote draft waiting for its category.
    pub fn new(
        remote: RemoteDraft,
        title: String,
        description: String,
        predictions: Vec<CategoryPrediction>,
        postal_code: Option<String>,
    ) -> Self {
        Self {
            state: FlowState::AwaitingCategory,
            remote,
            title,
            description,
            predictions,
            category: None,
            fields: CategoryFields::default(),
            attributes: BTreeMap::new(),
            price: None,
            shipping: None,
            package_size: None,
            postal_code,
            preserved: None,
            confirmation_message_id: None,
            publishing: false,
            image_count: 0,
            expiry: ExpiryTimer::new(),
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Apply a category and its field requirements.
    ///
    /// `autofill` holds selector guesses keyed by field id; invalid guesses
    /// are ignored. Preserved values compatible with the new category are
    /// restored before the next question is chosen.
    pub fn select_category(
        &mut self,
        category: SelectedCategory,
        fields: CategoryFields,
        autofill: &BTreeMap<String, String>,
    ) -> Result<&FlowState, StepError> {
        if self.state != FlowState::AwaitingCategory {
            return Err(StepError::OutOfOrder);
        }
        self.category = Some(category);
        self.attributes.clear();

        for field in &fields.fields {
            if let Some(value) = autofill.get(&field.id).and_then(|v| field.resolve(v)) {
                self.attributes.insert(field.id.clone(), value);
            }
        }

        if let Some(preserved) = self.preserved.take() {
            for (field_id, value) in &preserved.attributes {
                if self.attributes.contains_key(field_id) {
                    continue;
                }
                if let Some(value) = fields.field(field_id).and_then(|f| f.resolve(value)) {
                    self.attributes.insert(field_id.clone(), value);
                }
            }
            self.price = self.price.or(preserved.price);
            self.shipping = match preserved.shipping {
                Some(true) if !fields.shipping_allowed => None,
                other => self.shipping.or(other),
            };
            self.package_size = preserved
                .package_size
                .filter(|size| fields.package_sizes.iter().any(|p| &p.id == size));
        }

        self.fields = fields;
        Ok(self.advance())
    }

    /// Go back to category selection, stashing what was already answered.
    pub fn reselect_category(&mut self) {
        let preserved = PreservedValues {
            price: self.price.take(),
            shipping: self.shipping.take(),
            package_size: self.package_size.take(),
            attributes: std::mem::take(&mut self.attributes),
        };
        self.preserved = Some(preserved);
        self.category = None;
        self.fields = CategoryFields::default();
        self.state = FlowState::AwaitingCategory;
    }

    pub fn answer_attribute(&mut self, answer: &str) -> Result<&FlowState, StepError> {
        let FlowState::AwaitingAttribute { field_id } = &self.state else {
            return Err(StepError::OutOfOrder);
        };
        let field = self
            .fields
            .field(field_id)
            .ok_or(StepError::OutOfOrder)?;
        let value = field.resolve(answer).ok_or_else(|| InputError::Choice {
            field: field.label.clone(),
            value: answer.trim().to_string(),
        })?;
        self.attributes.insert(field.id.clone(), value);
        Ok(self.advance())
    }

    pub fn answer_price(&mut self, text: &str) -> Result<&FlowState, StepError> {
        self.expect(FlowState::AwaitingPrice)?;
        self.price = Some(input::parse_price(text)?);
        Ok(self.advance())
    }

    pub fn answer_shipping(&mut self, shipping: bool) -> Result<&FlowState, StepError> {
        self.expect(FlowState::AwaitingShipping)?;
        self.shipping = Some(shipping);
        if !shipping {
            self.package_size = None;
        }
        Ok(self.advance())
    }

    pub fn answer_package_size(&mut self, size_id: &str) -> Result<&FlowState, StepError> {
        self.expect(FlowState::AwaitingPackageSize)?;
        let size = self
            .fields
            .package_sizes
            .iter()
            .find(|p| p.id == size_id || p.label.eq_ignore_ascii_case(size_id.trim()))
            .ok_or_else(|| InputError::Choice {
                field: "package size".into(),
                value: size_id.to_string(),
            })?;
        self.package_size = Some(size.id.clone());
        Ok(self.advance())
    }

    pub fn answer_postal_code(&mut self, text: &str) -> Result<&FlowState, StepError> {
        self.expect(FlowState::AwaitingPostalCode)?;
        self.postal_code = Some(input::validate_postal_code(text)?);
        Ok(self.advance())
    }

    /// Apply a parsed free-text edit while the draft is ready.
    pub fn apply_edit(&mut self, intent: &EditIntent) -> Result<bool, StepError> {
        self.expect(FlowState::ReadyToPublish)?;
        match intent {
            EditIntent::Title(t) => self.title = input::non_empty(t)?,
            EditIntent::Description(d) => self.description = input::non_empty(d)?,
            EditIntent::Price(p) if *p >= 0.0 => self.price = Some(*p),
            EditIntent::Price(p) => return Err(InputError::Price(p.to_string()).into()),
            EditIntent::Unknown => return Ok(false),
        }
        Ok(true)
    }

    fn expect(&self, state: FlowState) -> Result<(), StepError> {
        if self.state == state {
            Ok(())
        } else {
            Err(StepError::OutOfOrder)
        }
    }

    /// Move to the first unresolved step.
    fn advance(&mut self) -> &FlowState {
        self.state = self.next_state();
        &self.state
    }

    fn next_state(&mut self) -> FlowState {
        if self.category.is_none() {
            return FlowState::AwaitingCategory;
        }
        if let Some(field) = self
            .fields
            .fields
            .iter()
            .find(|f| f.required && !self.attributes.contains_key(&f.id))
        {
            return FlowState::AwaitingAttribute {
                field_id: field.id.clone(),
            };
        }
        if self.price.is_none() {
            return FlowState::AwaitingPrice;
        }
        if self.shipping.is_none() {
            if !self.fields.shipping_allowed {
                self.shipping = Some(false);
            } else {
                return FlowState::AwaitingShipping;
            }
        }
        if self.shipping == Some(true)
            && self.package_size.is_none()
            && !self.fields.package_sizes.is_empty()
        {
            return FlowState::AwaitingPackageSize;
        }
        if self.postal_code.is_none() {
            return FlowState::AwaitingPostalCode;
        }
        FlowState::ReadyToPublish
    }

    pub fn is_giveaway(&self) -> bool {
        self.price == Some(0.0)
    }

    /// Everything collected so far, as one remote update.
    pub fn field_patch(&self) -> FieldPatch {
        FieldPatch {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            price: self.price,
            giveaway: Some(self.is_giveaway()),
            attributes: self.attributes.clone(),
        }
    }

    pub fn delivery_options(&self) -> Option<DeliveryOptions> {
        Some(DeliveryOptions {
            shipping: self.shipping?,
            package_size: self.package_size.clone(),
            postal_code: self.postal_code.clone()?,
        })
    }
}
