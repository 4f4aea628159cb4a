//! Translates finder selections into experience-query constraints.
//!
//! Every page that filters experiences (finder, search results, admin) goes
//! through [`FilterSelection`], so budget boundaries and category ids stay
//! identical across surfaces.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::backend::Filter;

pub const BUDGET_LOW: f64 = 50.0;
pub const BUDGET_MID: f64 = 100.0;
pub const BUDGET_HIGH: f64 = 200.0;

const PRICE_COLUMN: &str = "price_min";

/// Price band applied to an experience's minimum price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetBucket {
    /// price < 50
    Under50,
    /// 50 <= price <= 100
    From50To100,
    /// 100 < price <= 200
    From100To200,
    /// price > 200
    Over200,
}

impl BudgetBucket {
    pub const ALL: [BudgetBucket; 4] = [
        BudgetBucket::Under50,
        BudgetBucket::From50To100,
        BudgetBucket::From100To200,
        BudgetBucket::Over200,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetBucket::Under50 => "under_50",
            BudgetBucket::From50To100 => "50_100",
            BudgetBucket::From100To200 => "100_200",
            BudgetBucket::Over200 => "over_200",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BudgetBucket::Under50 => "Under €50",
            BudgetBucket::From50To100 => "€50 – €100",
            BudgetBucket::From100To200 => "€100 – €200",
            BudgetBucket::Over200 => "Over €200",
        }
    }

    pub fn filters(&self) -> Vec<Filter> {
        match self {
            BudgetBucket::Under50 => vec![Filter::lt(PRICE_COLUMN, BUDGET_LOW)],
            BudgetBucket::From50To100 => vec![
                Filter::gte(PRICE_COLUMN, BUDGET_LOW),
                Filter::lte(PRICE_COLUMN, BUDGET_MID),
            ],
            BudgetBucket::From100To200 => vec![
                Filter::gt(PRICE_COLUMN, BUDGET_MID),
                Filter::lte(PRICE_COLUMN, BUDGET_HIGH),
            ],
            BudgetBucket::Over200 => vec![Filter::gt(PRICE_COLUMN, BUDGET_HIGH)],
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        match self {
            BudgetBucket::Under50 => price < BUDGET_LOW,
            BudgetBucket::From50To100 => (BUDGET_LOW..=BUDGET_MID).contains(&price),
            BudgetBucket::From100To200 => price > BUDGET_MID && price <= BUDGET_HIGH,
            BudgetBucket::Over200 => price > BUDGET_HIGH,
        }
    }
}

impl FromStr for BudgetBucket {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "under_50" => Ok(BudgetBucket::Under50),
            "50_100" => Ok(BudgetBucket::From50To100),
            "100_200" => Ok(BudgetBucket::From100To200),
            "over_200" | "200_plus" => Ok(BudgetBucket::Over200),
            other => Err(format!("unknown budget bucket '{other}'")),
        }
    }
}

impl fmt::Display for BudgetBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDef {
    pub id: i64,
    pub key: &'static str,
    pub label: &'static str,
}

/// Category ids as seeded in `schema/001_core.sql`.
pub const CATEGORIES: &[CategoryDef] = &[
    CategoryDef { id: 1, key: "outdoors", label: "Outdoors" },
    CategoryDef { id: 2, key: "food_drink", label: "Food & Drink" },
    CategoryDef { id: 3, key: "wellness", label: "Wellness" },
    CategoryDef { id: 4, key: "culture", label: "Culture & Heritage" },
    CategoryDef { id: 5, key: "adventure", label: "Adventure" },
    CategoryDef { id: 6, key: "workshops", label: "Workshops & Classes" },
    CategoryDef { id: 7, key: "family", label: "Family" },
    CategoryDef { id: 8, key: "nightlife", label: "Nightlife" },
];

pub const COUNTIES: &[&str] = &[
    "Carlow", "Cavan", "Clare", "Cork", "Donegal", "Dublin", "Galway", "Kerry", "Kildare",
    "Kilkenny", "Laois", "Leitrim", "Limerick", "Longford", "Louth", "Mayo", "Meath",
    "Monaghan", "Offaly", "Roscommon", "Sligo", "Tipperary", "Waterford", "Westmeath",
    "Wexford", "Wicklow",
];

/// Matches a UI label or internal key, ignoring case.
pub fn category_by_label(label: &str) -> Option<&'static CategoryDef> {
    let needle = label.trim();
    CATEGORIES
        .iter()
        .find(|c| c.label.eq_ignore_ascii_case(needle) || c.key.eq_ignore_ascii_case(needle))
}

pub fn category_by_id(id: i64) -> Option<&'static CategoryDef> {
    CATEGORIES.iter().find(|c| c.id == id)
}

pub fn category_label(id: i64) -> &'static str {
    category_by_id(id).map_or("Other", |c| c.label)
}

/// Raw query-string parameters carried between pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub county: Option<String>,
    pub budget: Option<String>,
    pub source: Option<String>,
}

/// Normalised selections; `None` always means "no constraint".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSelection {
    pub category_id: Option<i64>,
    pub county: Option<String>,
    pub budget: Option<BudgetBucket>,
    pub text: Option<String>,
    pub source: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl FilterSelection {
    pub fn from_params(params: &FilterParams) -> Self {
        let category_id = non_blank(params.category.as_ref().or(params.kind.as_ref()))
            .and_then(|raw| match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    let found = category_by_label(&raw).map(|c| c.id);
                    if found.is_none() {
                        log::debug!("Ignoring unknown category label '{raw}'");
                    }
                    found
                }
            });

        let budget = non_blank(params.budget.as_ref()).and_then(|raw| match raw.parse() {
            Ok(bucket) => Some(bucket),
            Err(err) => {
                log::debug!("Ignoring budget selection: {err}");
                None
            }
        });

        Self {
            category_id,
            county: non_blank(params.county.as_ref()),
            budget,
            text: non_blank(params.q.as_ref()),
            source: non_blank(params.source.as_ref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.county.is_none()
            && self.budget.is_none()
            && self.text.is_none()
    }

    /// Query string that reproduces this selection on another page.
    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(text) = &self.text {
            pairs.push(("q", text.clone()));
        }
        if let Some(id) = self.category_id {
            pairs.push(("category", id.to_string()));
        }
        if let Some(county) = &self.county {
            pairs.push(("county", county.clone()));
        }
        if let Some(budget) = self.budget {
            pairs.push(("budget", budget.as_str().to_string()));
        }
        if let Some(source) = &self.source {
            pairs.push(("source", source.clone()));
        }
        encode_pairs(&pairs)
    }
}

/// Constraints on the experiences table, minus the category membership,
/// which has to be resolved through the link table first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposedFilter {
    pub category_id: Option<i64>,
    pub constraints: Vec<Filter>,
}

pub fn compose(selection: &FilterSelection) -> ComposedFilter {
    let mut constraints = Vec::new();

    if let Some(county) = &selection.county {
        constraints.push(Filter::eq("county", county.as_str()));
    }
    if let Some(budget) = selection.budget {
        constraints.extend(budget.filters());
    }
    if let Some(text) = selection.text.as_deref().and_then(text_filter) {
        constraints.push(text);
    }

    ComposedFilter {
        category_id: selection.category_id,
        constraints,
    }
}

/// Partial, case-insensitive match on title or long description. Characters
/// that would break the REST filter grammar are dropped from the term.
pub fn text_filter(term: &str) -> Option<Filter> {
    let cleaned: String = term
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\' | '%'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    let pattern = format!("*{cleaned}*");
    Some(Filter::Or(vec![
        Filter::ilike("title", pattern.clone()),
        Filter::ilike("long_description", pattern),
    ]))
}

/// Filters every non-privileged read path applies.
pub fn public_visibility() -> Vec<Filter> {
    vec![
        Filter::ilike("status", "approved"),
        Filter::eq("is_published", true),
    ]
}

pub fn encode_pairs(pairs: &[(&str, String)]) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://localhost/") else {
        return String::new();
    };
    if pairs.is_empty() {
        return String::new();
    }
    url.query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
    url.query().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn budget_buckets_partition_the_price_line() {
        let mut price = 0.0;
        while price <= 400.0 {
            let hits = BudgetBucket::ALL.iter().filter(|b| b.contains(price)).count();
            assert_eq!(hits, 1, "price {price} matched {hits} buckets");
            price += 0.5;
        }
    }

    #[test]
    fn budget_boundaries_are_exact() {
        assert!(!BudgetBucket::Under50.contains(50.0));
        assert!(BudgetBucket::Under50.contains(49.99));
        assert!(BudgetBucket::From50To100.contains(50.0));
        assert!(BudgetBucket::From50To100.contains(100.0));
        assert!(!BudgetBucket::From100To200.contains(100.0));
        assert!(BudgetBucket::From100To200.contains(200.0));
        assert!(!BudgetBucket::Over200.contains(200.0));
        assert!(BudgetBucket::Over200.contains(200.01));
    }

    #[test]
    fn budget_filters_agree_with_contains() {
        for bucket in BudgetBucket::ALL {
            for price in [0.0, 49.5, 50.0, 75.0, 100.0, 100.5, 200.0, 250.0] {
                let row = json!({ "price_min": price });
                let by_filter = bucket.filters().iter().all(|f| f.matches(&row));
                assert_eq!(by_filter, bucket.contains(price), "{bucket} at {price}");
            }
        }
    }

    #[test]
    fn parses_selection_from_labels_and_ids() {
        let selection = FilterSelection::from_params(&params(&[
            ("category", "Outdoors"),
            ("county", " Dublin "),
            ("budget", "50_100"),
            ("q", "  "),
        ]));
        assert_eq!(selection.category_id, Some(1));
        assert_eq!(selection.county.as_deref(), Some("Dublin"));
        assert_eq!(selection.budget, Some(BudgetBucket::From50To100));
        assert_eq!(selection.text, None);

        let by_type = FilterSelection::from_params(&params(&[("type", "food_drink")]));
        assert_eq!(by_type.category_id, Some(2));

        let by_id = FilterSelection::from_params(&params(&[("category", "5")]));
        assert_eq!(by_id.category_id, Some(5));
    }

    #[test]
    fn unknown_labels_and_buckets_add_no_constraint() {
        let selection = FilterSelection::from_params(&params(&[
            ("category", "Underwater Basket Weaving"),
            ("budget", "cheap"),
        ]));
        assert!(selection.is_empty());
        assert!(compose(&selection).constraints.is_empty());
    }

    #[test]
    fn compose_ands_active_constraints() {
        let selection = FilterSelection {
            county: Some("Kerry".into()),
            budget: Some(BudgetBucket::Over200),
            text: Some("boat".into()),
            ..Default::default()
        };
        let composed = compose(&selection);
        assert_eq!(composed.constraints.len(), 3);

        let hit = json!({ "county": "Kerry", "price_min": 250, "title": "Boat trip", "long_description": null });
        let miss = json!({ "county": "Kerry", "price_min": 150, "title": "Boat trip" });
        assert!(composed.constraints.iter().all(|f| f.matches(&hit)));
        assert!(!composed.constraints.iter().all(|f| f.matches(&miss)));
    }

    #[test]
    fn text_filter_matches_title_or_description() {
        let filter = text_filter("Kayak").unwrap();
        assert!(filter.matches(&json!({ "title": "Sea KAYAKING", "long_description": null })));
        assert!(filter.matches(&json!({ "title": "Tour", "long_description": "by kayak" })));
        assert!(!filter.matches(&json!({ "title": "Tour", "long_description": "on foot" })));
        assert!(text_filter("(),*").is_none());
    }

    #[test]
    fn query_string_encodes_selection() {
        let selection = FilterSelection {
            category_id: Some(1),
            county: Some("Dún Laoghaire".into()),
            budget: Some(BudgetBucket::Under50),
            text: Some("fish & chips".into()),
            source: Some("newsletter".into()),
        };
        let encoded = selection.to_query_string();
        assert!(encoded.contains("budget=under_50"));
        assert!(encoded.contains("q=fish+%26+chips"));
        assert!(FilterSelection::default().to_query_string().is_empty());
    }

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(category_label(1), "Outdoors");
        assert_eq!(category_label(999), "Other");
        assert_eq!(category_by_label("OUTDOORS").map(|c| c.id), Some(1));
    }
}
