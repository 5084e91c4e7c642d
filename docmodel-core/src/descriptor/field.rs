//! Field descriptors

use crate::convert::convert_to_value_class;
use crate::error::ConversionError;
use crate::logic::{
    or, ConstantLogic, DefaultValueExpression, FieldValueProvider, LogicExpression,
    LookupDescriptor, SharedLogic,
};
use crate::values::{FieldValue, LookupValueByIdSupplier, ValueClass, WidgetType};
use std::sync::Arc;

/// Audit columns maintained by the store; never edited, never mandatory
pub const CREATED_UPDATED_FIELDS: [&str; 4] = ["Created", "CreatedBy", "Updated", "UpdatedBy"];

/// Immutable description of one field of an entity
#[derive(Debug, Clone)]
pub struct DocumentFieldDescriptor {
    field_name: String,
    widget_type: WidgetType,
    value_class: ValueClass,
    key: bool,
    parent_link: bool,
    virtual_field: bool,
    always_updateable: bool,
    readonly_logic: SharedLogic,
    display_logic: SharedLogic,
    mandatory_logic: SharedLogic,
    default_value: Option<Arc<dyn DefaultValueExpression>>,
    lookup: Option<LookupDescriptor>,
    value_provider: Option<Arc<dyn FieldValueProvider>>,
}

impl DocumentFieldDescriptor {
    pub fn builder(field_name: impl Into<String>) -> DocumentFieldDescriptorBuilder {
        DocumentFieldDescriptorBuilder::new(field_name)
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn widget_type(&self) -> WidgetType {
        self.widget_type
    }

    pub fn value_class(&self) -> ValueClass {
        self.value_class
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    /// Parent link of an included entity (only set on detail entities).
    pub fn is_parent_link(&self) -> bool {
        self.parent_link
    }

    pub fn is_virtual_field(&self) -> bool {
        self.virtual_field
    }

    pub fn is_always_updateable(&self) -> bool {
        self.always_updateable
    }

    /// Effective readonly logic (entity and field logic combined).
    pub fn readonly_logic(&self) -> &SharedLogic {
        &self.readonly_logic
    }

    pub fn display_logic(&self) -> &SharedLogic {
        &self.display_logic
    }

    /// Effective mandatory logic.
    pub fn mandatory_logic(&self) -> &SharedLogic {
        &self.mandatory_logic
    }

    pub fn default_value(&self) -> Option<&Arc<dyn DefaultValueExpression>> {
        self.default_value.as_ref()
    }

    pub fn lookup(&self) -> Option<&LookupDescriptor> {
        self.lookup.as_ref()
    }

    pub fn lookup_supplier(&self) -> Option<&dyn LookupValueByIdSupplier> {
        self.lookup
            .as_ref()
            .and_then(|lookup| lookup.supplier.as_deref())
    }

    pub fn value_provider(&self) -> Option<&Arc<dyn FieldValueProvider>> {
        self.value_provider.as_ref()
    }

    /// Convert a raw value to this field's value class. The caller's
    /// supplier wins over the one configured on the field's lookup.
    pub fn convert_value(
        &self,
        value: Option<FieldValue>,
        lookups: Option<&dyn LookupValueByIdSupplier>,
    ) -> Result<Option<FieldValue>, ConversionError> {
        convert_to_value_class(
            &self.field_name,
            value,
            self.widget_type,
            self.value_class,
            lookups.or_else(|| self.lookup_supplier()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct DocumentFieldDescriptorBuilder {
    field_name: String,
    widget_type: WidgetType,
    value_class: Option<ValueClass>,
    key: bool,
    parent_link: bool,
    virtual_field: bool,
    always_updateable: bool,
    readonly_logic: SharedLogic,
    display_logic: SharedLogic,
    mandatory_logic: SharedLogic,
    default_value: Option<Arc<dyn DefaultValueExpression>>,
    lookup: Option<LookupDescriptor>,
    value_provider: Option<Arc<dyn FieldValueProvider>>,
}

impl DocumentFieldDescriptorBuilder {
    fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            widget_type: WidgetType::Text,
            value_class: None,
            key: false,
            parent_link: false,
            virtual_field: false,
            always_updateable: false,
            readonly_logic: Arc::new(ConstantLogic::FALSE),
            display_logic: Arc::new(ConstantLogic::TRUE),
            mandatory_logic: Arc::new(ConstantLogic::FALSE),
            default_value: None,
            lookup: None,
            value_provider: None,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn widget_type(mut self, widget_type: WidgetType) -> Self {
        self.widget_type = widget_type;
        self
    }

    /// Overrides the value class derived from the widget type.
    pub fn value_class(mut self, value_class: ValueClass) -> Self {
        self.value_class = Some(value_class);
        self
    }

    pub fn key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    pub fn parent_link(mut self, parent_link: bool) -> Self {
        self.parent_link = parent_link;
        self
    }

    pub fn always_updateable(mut self, always_updateable: bool) -> Self {
        self.always_updateable = always_updateable;
        self
    }

    pub fn readonly_logic(mut self, logic: SharedLogic) -> Self {
        self.readonly_logic = logic;
        self
    }

    pub fn display_logic(mut self, logic: SharedLogic) -> Self {
        self.display_logic = logic;
        self
    }

    pub fn mandatory_logic(mut self, logic: SharedLogic) -> Self {
        self.mandatory_logic = logic;
        self
    }

    pub fn mandatory(self, mandatory: bool) -> Self {
        self.mandatory_logic(ConstantLogic::shared(mandatory))
    }

    pub fn default_value(mut self, expression: impl DefaultValueExpression + 'static) -> Self {
        self.default_value = Some(Arc::new(expression));
        self
    }

    pub fn lookup(mut self, lookup: LookupDescriptor) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Makes this a virtual field whose value is computed by `provider`.
    pub fn virtual_value(mut self, provider: impl FieldValueProvider + 'static) -> Self {
        self.virtual_field = true;
        self.value_provider = Some(Arc::new(provider));
        self
    }

    /// Resolve effective logic against the owning entity.
    pub(crate) fn build(
        self,
        entity_readonly: &SharedLogic,
        is_detail: bool,
    ) -> DocumentFieldDescriptor {
        let parent_link_effective = self.parent_link && is_detail;
        let created_updated = CREATED_UPDATED_FIELDS.contains(&self.field_name.as_str());

        let readonly_logic = if parent_link_effective
            || self.virtual_field
            || self.key
            || entity_readonly.is_constant_true()
            || self.readonly_logic.is_constant_true()
            || created_updated
        {
            ConstantLogic::shared(true)
        } else {
            or(entity_readonly.clone(), self.readonly_logic.clone())
        };

        let mandatory_logic = if parent_link_effective {
            ConstantLogic::shared(true)
        } else if created_updated || self.virtual_field {
            ConstantLogic::shared(false)
        } else {
            self.mandatory_logic.clone()
        };

        DocumentFieldDescriptor {
            value_class: self
                .value_class
                .unwrap_or_else(|| self.widget_type.default_value_class()),
            field_name: self.field_name,
            widget_type: self.widget_type,
            key: self.key,
            parent_link: parent_link_effective,
            virtual_field: self.virtual_field,
            always_updateable: self.always_updateable,
            readonly_logic,
            display_logic: self.display_logic,
            mandatory_logic,
            default_value: self.default_value,
            lookup: self.lookup,
            value_provider: self.value_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::FnLogic;

    fn editable() -> SharedLogic {
        ConstantLogic::shared(false)
    }

    fn discount_logic() -> SharedLogic {
        FnLogic::shared("IsDiscounted=N", ["IsDiscounted"], |ctx| {
            ctx.value("IsDiscounted").and_then(|v| v.as_bool()) != Some(true)
        })
    }

    #[test]
    fn test_value_class_from_widget() {
        let field = DocumentFieldDescriptor::builder("Total")
            .widget_type(WidgetType::Amount)
            .build(&editable(), false);
        assert_eq!(field.value_class(), ValueClass::Decimal);

        let overridden = DocumentFieldDescriptor::builder("C_BPartner_ID")
            .widget_type(WidgetType::Lookup)
            .value_class(ValueClass::Integer)
            .build(&editable(), false);
        assert_eq!(overridden.value_class(), ValueClass::Integer);
    }

    #[test]
    fn test_effective_readonly() {
        let key = DocumentFieldDescriptor::builder("C_Order_ID")
            .key(true)
            .build(&editable(), false);
        assert!(key.readonly_logic().is_constant_true());

        let created = DocumentFieldDescriptor::builder("Created").build(&editable(), false);
        assert!(created.readonly_logic().is_constant_true());
        assert!(created.mandatory_logic().is_constant_false());

        let from_entity = DocumentFieldDescriptor::builder("Description")
            .build(&ConstantLogic::shared(true), false);
        assert!(from_entity.readonly_logic().is_constant_true());

        let plain = DocumentFieldDescriptor::builder("DiscountRate")
            .readonly_logic(discount_logic())
            .build(&editable(), false);
        assert_eq!(plain.readonly_logic().parameters(), discount_logic().parameters());
        assert!(plain.readonly_logic().constant_value().is_none());
    }

    #[test]
    fn test_parent_link_only_on_detail() {
        let on_detail = DocumentFieldDescriptor::builder("C_Order_ID")
            .parent_link(true)
            .build(&editable(), true);
        assert!(on_detail.is_parent_link());
        assert!(on_detail.readonly_logic().is_constant_true());
        assert!(on_detail.mandatory_logic().is_constant_true());

        let on_root = DocumentFieldDescriptor::builder("C_Order_ID")
            .parent_link(true)
            .build(&editable(), false);
        assert!(!on_root.is_parent_link());
        assert!(on_root.readonly_logic().is_constant_false());
    }

    #[test]
    fn test_convert_value_uses_widget() {
        let field = DocumentFieldDescriptor::builder("Qty")
            .widget_type(WidgetType::Integer)
            .build(&editable(), false);
        assert_eq!(
            field.convert_value(Some(FieldValue::from("4")), None),
            Ok(Some(FieldValue::Integer(4)))
        );
    }
}
