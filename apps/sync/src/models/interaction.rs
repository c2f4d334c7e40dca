use serde::{Deserialize, Serialize};

/// Target row of the `customer_interactions` table, keyed by `airtable_id`.
///
/// `last_synced`, `created_at` and `updated_at` are owned by the destination
/// and therefore not carried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEntity {
    pub airtable_id: String,
    pub linked_customers: Vec<String>,
    pub customer_name_country: String,
    pub categories: Option<String>,
    pub summary_en: Option<String>,
    pub summary_cn: Option<String>,
    pub summary_idioma: Option<String>,
    pub update_content: Option<String>,
    pub update_content_idioma: Option<String>,
    pub airtable_last_modified: Option<String>,
}
