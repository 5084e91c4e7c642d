//! Runtime state of one document field

use crate::dependency::DependencyType;
use crate::descriptor::DocumentFieldDescriptor;
use crate::error::ConversionError;
use crate::logic::{Evaluatee, LogicResult};
use crate::values::{FieldValue, LookupValueByIdSupplier};
use std::sync::Arc;

/// Value, initial value and computed flags of a field.
///
/// The initial value is the snapshot taken at load (or at the last save);
/// [`DocumentField::has_changes`] compares against it.
#[derive(Debug, Clone)]
pub struct DocumentField {
    descriptor: Arc<DocumentFieldDescriptor>,
    value: Option<FieldValue>,
    initial_value: Option<FieldValue>,
    initial_value_set: bool,
    readonly: bool,
    mandatory: bool,
    displayed: bool,
    lookup_values_stale: bool,
}

impl DocumentField {
    pub fn new(descriptor: Arc<DocumentFieldDescriptor>) -> Self {
        let readonly = descriptor.readonly_logic().constant_value().unwrap_or(false);
        let mandatory = descriptor.mandatory_logic().constant_value().unwrap_or(false);
        let displayed = descriptor.display_logic().constant_value().unwrap_or(true);
        Self {
            descriptor,
            value: None,
            initial_value: None,
            initial_value_set: false,
            readonly,
            mandatory,
            displayed,
            lookup_values_stale: true,
        }
    }

    pub fn descriptor(&self) -> &Arc<DocumentFieldDescriptor> {
        &self.descriptor
    }

    pub fn field_name(&self) -> &str {
        self.descriptor.field_name()
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn initial_value(&self) -> Option<&FieldValue> {
        self.initial_value.as_ref()
    }

    /// Null and empty text both count as "no value".
    pub fn has_value(&self) -> bool {
        match &self.value {
            None => false,
            Some(FieldValue::Text(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    /// The cached lookup option list must be fetched again.
    pub fn is_lookup_values_stale(&self) -> bool {
        self.lookup_values_stale
    }

    pub fn mark_lookup_values_fresh(&mut self) {
        self.lookup_values_stale = false;
    }

    /// Convert and store `raw`. The first value ever stored also becomes the
    /// initial value. Returns whether the stored value changed.
    pub fn set_value(
        &mut self,
        raw: Option<FieldValue>,
        lookups: Option<&dyn LookupValueByIdSupplier>,
    ) -> Result<bool, ConversionError> {
        let value = self.descriptor.convert_value(raw, lookups)?;
        Ok(self.store(value))
    }

    /// Convert and store `raw` as both value and initial value.
    pub fn set_initial_value(
        &mut self,
        raw: Option<FieldValue>,
        lookups: Option<&dyn LookupValueByIdSupplier>,
    ) -> Result<(), ConversionError> {
        let value = self.descriptor.convert_value(raw, lookups)?;
        self.initial_value = value.clone();
        self.initial_value_set = true;
        self.value = value;
        Ok(())
    }

    fn store(&mut self, value: Option<FieldValue>) -> bool {
        if !self.initial_value_set {
            self.initial_value = value.clone();
            self.initial_value_set = true;
        }
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    pub fn has_changes(&self) -> bool {
        self.value != self.initial_value
    }

    /// Take the current value as the new baseline (after a save).
    pub fn reset_initial_value(&mut self) {
        self.initial_value = self.value.clone();
        self.initial_value_set = true;
    }

    /// Restore the initial value. Returns whether the value changed.
    pub fn revert(&mut self) -> bool {
        if self.value == self.initial_value {
            return false;
        }
        self.value = self.initial_value.clone();
        true
    }

    /// Re-evaluate the logic of `kind` against `ctx`. A `NoResult`
    /// evaluation keeps the previous flag. Returns whether the flag changed.
    pub fn update_logic(&mut self, kind: DependencyType, ctx: &dyn Evaluatee) -> bool {
        match kind {
            DependencyType::ReadonlyLogic => {
                let result = self.descriptor.readonly_logic().evaluate(ctx);
                apply(&mut self.readonly, result)
            }
            DependencyType::DisplayLogic => {
                let result = self.descriptor.display_logic().evaluate(ctx);
                apply(&mut self.displayed, result)
            }
            DependencyType::MandatoryLogic => {
                let result = self.descriptor.mandatory_logic().evaluate(ctx);
                apply(&mut self.mandatory, result)
            }
            DependencyType::LookupValues => {
                let was_stale = self.lookup_values_stale;
                self.lookup_values_stale = true;
                !was_stale
            }
            DependencyType::FieldValue => false,
        }
    }
}

fn apply(flag: &mut bool, result: LogicResult) -> bool {
    match result.as_bool() {
        Some(value) if value != *flag => {
            *flag = value;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EntityDescriptor;
    use crate::logic::{ConstantLogic, FnLogic};
    use crate::repository::InMemoryDocumentsRepository;
    use crate::values::WidgetType;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn descriptors() -> Arc<EntityDescriptor> {
        EntityDescriptor::builder("C_Order", Arc::new(InMemoryDocumentsRepository::new()))
            .field(DocumentFieldDescriptor::builder("Total").widget_type(WidgetType::Amount))
            .field(
                DocumentFieldDescriptor::builder("DiscountRate")
                    .widget_type(WidgetType::Number)
                    .readonly_logic(FnLogic::shared("IsDiscounted=N", ["IsDiscounted"], |ctx| {
                        ctx.value("IsDiscounted").and_then(FieldValue::as_bool) != Some(true)
                    })),
            )
            .field(DocumentFieldDescriptor::builder("Created").widget_type(WidgetType::DateTime))
            .field(
                DocumentFieldDescriptor::builder("Note")
                    .display_logic(ConstantLogic::shared(false)),
            )
            .build()
            .unwrap()
    }

    fn field(name: &str) -> DocumentField {
        let entity = descriptors();
        DocumentField::new(Arc::clone(entity.field(name).unwrap()))
    }

    #[test]
    fn test_constant_flags_on_creation() {
        assert!(field("Created").is_readonly());
        assert!(!field("Created").is_mandatory());
        assert!(!field("Note").is_displayed());
        assert!(!field("Total").is_readonly());
    }

    #[test]
    fn test_first_value_becomes_initial() {
        let mut total = field("Total");
        assert!(total.set_value(Some(FieldValue::from("10")), None).unwrap());
        assert_eq!(total.initial_value(), Some(&FieldValue::Decimal(Decimal::from(10))));
        assert!(!total.has_changes());

        assert!(total.set_value(Some(FieldValue::Integer(12)), None).unwrap());
        assert!(total.has_changes());
        assert!(!total.set_value(Some(FieldValue::Integer(12)), None).unwrap());

        assert!(total.revert());
        assert!(!total.has_changes());
    }

    #[test]
    fn test_conversion_error_leaves_value() {
        let mut total = field("Total");
        total.set_initial_value(Some(FieldValue::Integer(1)), None).unwrap();
        assert!(total.set_value(Some(FieldValue::Boolean(true)), None).is_err());
        assert_eq!(total.value(), Some(&FieldValue::Decimal(Decimal::ONE)));
    }

    #[test]
    fn test_no_result_keeps_flag() {
        let mut rate = field("DiscountRate");
        let discounted = BTreeMap::from([("IsDiscounted".to_string(), FieldValue::Boolean(true))]);
        let not_discounted =
            BTreeMap::from([("IsDiscounted".to_string(), FieldValue::Boolean(false))]);
        let unknown: BTreeMap<String, FieldValue> = BTreeMap::new();

        assert!(rate.update_logic(DependencyType::ReadonlyLogic, &not_discounted));
        assert!(rate.is_readonly());
        assert!(!rate.update_logic(DependencyType::ReadonlyLogic, &unknown));
        assert!(rate.is_readonly());
        assert!(rate.update_logic(DependencyType::ReadonlyLogic, &discounted));
        assert!(!rate.is_readonly());
    }

    #[test]
    fn test_lookup_values_invalidation() {
        let mut total = field("Total");
        total.mark_lookup_values_fresh();
        let ctx: BTreeMap<String, FieldValue> = BTreeMap::new();
        assert!(total.update_logic(DependencyType::LookupValues, &ctx));
        assert!(total.is_lookup_values_stale());
    }

    #[test]
    fn test_has_value() {
        let mut note = field("Note");
        assert!(!note.has_value());
        note.set_value(Some(FieldValue::from("")), None).unwrap();
        assert!(!note.has_value());
        note.set_value(Some(FieldValue::from("x")), None).unwrap();
        assert!(note.has_value());
    }
}
