//! Core record types for the Barnivore catalog: companies, their products, and the
//! JSON envelopes the public API wraps them in.

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// Source categories exposed by the list endpoints, in fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Beer,
    Wine,
    Liquor,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Beer, Category::Wine, Category::Liquor];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Beer => "beer",
            Category::Wine => "wine",
            Category::Liquor => "liquor",
        }
    }

    /// Path of the list endpoint relative to the API base URL.
    pub fn path(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manufacturer record. List endpoints return it without products (the shallow
/// record); the detail endpoint embeds the product list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Company {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub checked_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_on: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doubled_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub editor: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fax: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub postal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub red_yellow_green: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_on: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_products")]
    pub products: Vec<Product>,
    /// Product entries dropped while decoding because they had no usable id.
    #[serde(skip)]
    pub skipped_products: usize,
}

impl Company {
    pub fn display_name(&self) -> &str {
        self.company_name.as_deref().unwrap_or("Unknown")
    }
}

/// A product owned by exactly one company. The owner id is taken from the
/// enclosing company record, never from the product payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub booze_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub red_yellow_green: Option<String>,
}

/// Companies decoded from one list body, plus the number of wrapped items that
/// were dropped because they lacked a usable `company` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyList {
    pub companies: Vec<Company>,
    pub skipped: usize,
}

/// Decode a list endpoint body: a JSON array of `{"company": {...}}` items.
pub fn decode_company_list(body: &[u8]) -> Result<CompanyList, serde_json::Error> {
    let items: Vec<JsonValue> = serde_json::from_slice(body)?;
    let mut out = CompanyList::default();
    for mut item in items {
        let Some(company) = item.get_mut("company").map(JsonValue::take) else {
            continue;
        };
        match decode_company_value(company) {
            Ok(company) => out.companies.push(company),
            Err(_) => out.skipped += 1,
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    #[serde(default)]
    company: Option<JsonValue>,
}

/// Decode a detail endpoint body: `{"company": {..., "products": [...]}}`.
/// Returns `Ok(None)` when the envelope carries no company.
pub fn decode_company_detail(body: &[u8]) -> Result<Option<Company>, serde_json::Error> {
    let envelope: DetailEnvelope = serde_json::from_slice(body)?;
    match envelope.company {
        None | Some(JsonValue::Null) => Ok(None),
        Some(company) => decode_company_value(company).map(Some),
    }
}

/// Decode one company object. Products are decoded one by one so a bad entry
/// is dropped and counted instead of failing the whole company.
fn decode_company_value(mut company: JsonValue) -> Result<Company, serde_json::Error> {
    let raw_products = company
        .as_object_mut()
        .and_then(|fields| fields.remove("products"));
    let mut decoded: Company = serde_json::from_value(company)?;

    if let Some(JsonValue::Array(entries)) = raw_products {
        for entry in entries {
            match serde_json::from_value::<Product>(entry) {
                Ok(product) => decoded.products.push(product),
                Err(_) => decoded.skipped_products += 1,
            }
        }
    }
    Ok(decoded)
}

fn lenient_products<'de, D>(deserializer: D) -> Result<Vec<Product>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(JsonValue::Array(entries)) = Option::<JsonValue>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(s)) => Some(s),
        Some(JsonValue::Bool(b)) => Some(b.to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("id {n} is not an integer"))),
        JsonValue::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("id {s:?} is not an integer"))),
        other => Err(D::Error::custom(format!("unexpected id value {other}"))),
    }
}
