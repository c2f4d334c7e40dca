use crate::models::interaction::InteractionEntity;
use crate::models::source::SourceRecord;
use crate::sync::fields::{CanonicalField, FieldMap};

/// Maps one source record onto the `customer_interactions` schema.
///
/// Returns `None` when the record has no customer name; such rows are
/// internal notes, not customer interactions. No I/O.
pub fn convert(record: &SourceRecord, fields: &FieldMap) -> Option<InteractionEntity> {
    let scalar = |field| fields.scalar(&record.fields, field);

    let customer_name_country = scalar(CanonicalField::CustomerNameCountry)?;

    Some(InteractionEntity {
        airtable_id: record.id.clone(),
        linked_customers: fields.list(&record.fields, CanonicalField::LinkedCustomers),
        customer_name_country,
        categories: scalar(CanonicalField::Categories),
        summary_en: scalar(CanonicalField::SummaryEn),
        summary_cn: scalar(CanonicalField::SummaryCn),
        summary_idioma: scalar(CanonicalField::SummaryIdioma),
        update_content: scalar(CanonicalField::UpdateContent),
        update_content_idioma: scalar(CanonicalField::UpdateContentIdioma),
        airtable_last_modified: scalar(CanonicalField::AirtableLastModified),
    })
}
