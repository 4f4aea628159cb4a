//! Pure HTML rendering. Nothing here touches the platform; every function
//! takes already-loaded rows and returns markup.

pub mod pages;

use uuid::Uuid;

use crate::context::PageContext;
use crate::filters::{category_label, encode_pairs};
use crate::gate::NavVariant;
use crate::models::{ExperienceImage, ExperienceListing};
use crate::search::SearchOutcome;

pub const PLACEHOLDER_IMAGE: &str = "/static/placeholder.svg";

pub const LOADING_MESSAGE: &str = "Loading experiences…";
pub const EMPTY_MESSAGE: &str = "No experiences match your filters.";
pub const ERROR_MESSAGE: &str = "Results are unavailable right now. Please try again shortly.";

/// Escapes text for element content and quoted attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// The flagged primary image, else the lowest display order.
pub fn primary_image(images: &[ExperienceImage]) -> Option<&ExperienceImage> {
    let usable = images.iter().filter(|i| !i.url.trim().is_empty());
    usable
        .clone()
        .find(|i| i.is_primary)
        .or_else(|| usable.min_by_key(|i| i.display_order))
}

pub fn primary_image_url(images: &[ExperienceImage]) -> &str {
    primary_image(images).map_or(PLACEHOLDER_IMAGE, |i| i.url.as_str())
}

pub fn format_money(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("€{amount:.0}")
    } else {
        format!("€{amount:.2}")
    }
}

pub fn format_price(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{} – {}", format_money(min), format_money(max)),
        (Some(min), None) => format!("From {}", format_money(min)),
        _ => "Price TBD".to_string(),
    }
}

pub fn detail_href(experience_id: Uuid, source: Option<&str>) -> String {
    match source {
        Some(source) => format!(
            "/experiences/{experience_id}?{}",
            encode_pairs(&[("source", source.to_string())])
        ),
        None => format!("/experiences/{experience_id}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: AlertKind::Info, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: AlertKind::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: AlertKind::Error, message: message.into() }
    }
}

/// Inline alert with a close button.
pub fn alert(alert: &Alert) -> String {
    let class = match alert.kind {
        AlertKind::Info => "alert-info",
        AlertKind::Success => "alert-success",
        AlertKind::Error => "alert-error",
    };
    format!(
        r#"<div class="alert {class}" role="alert"><span>{}</span><button type="button" class="alert-close" aria-label="Dismiss" onclick="this.parentElement.remove()">&times;</button></div>"#,
        escape_html(&alert.message)
    )
}

/// The states a results container can be in.
#[derive(Debug, Clone, Copy)]
pub enum ResultsState<'a> {
    Loading,
    Empty,
    Error,
    Results(&'a [ExperienceListing]),
}

impl<'a> From<&'a SearchOutcome> for ResultsState<'a> {
    fn from(outcome: &'a SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Results(listings) => ResultsState::Results(listings),
            SearchOutcome::Empty => ResultsState::Empty,
            SearchOutcome::Unavailable => ResultsState::Error,
        }
    }
}

pub fn results(state: ResultsState<'_>, source: Option<&str>) -> String {
    match state {
        ResultsState::Loading => format!(
            r#"<div class="results-state results-loading" aria-busy="true">{LOADING_MESSAGE}</div>"#
        ),
        ResultsState::Empty => {
            format!(r#"<div class="results-state results-empty">{EMPTY_MESSAGE}</div>"#)
        }
        ResultsState::Error => {
            format!(r#"<div class="results-state results-error" role="alert">{ERROR_MESSAGE}</div>"#)
        }
        ResultsState::Results(listings) => {
            let cards: String = listings
                .iter()
                .map(|listing| experience_card(listing, source))
                .collect();
            format!(r#"<div class="results-grid">{cards}</div>"#)
        }
    }
}

pub fn experience_card(listing: &ExperienceListing, source: Option<&str>) -> String {
    let e = &listing.experience;
    let href = escape_html(&detail_href(e.id, source));
    let business = listing
        .business
        .as_ref()
        .map(|b| format!(r#"<p class="card-business">{}</p>"#, escape_html(&b.name)))
        .unwrap_or_default();
    let county = e
        .county
        .as_deref()
        .map(|c| format!(r#"<span class="card-county">{}</span>"#, escape_html(c)))
        .unwrap_or_default();
    let tags: String = listing
        .category_ids
        .iter()
        .map(|id| format!(r#"<span class="tag">{}</span>"#, escape_html(category_label(*id))))
        .collect();
    let summary = e
        .short_description
        .as_deref()
        .map(|s| format!(r#"<p class="card-summary">{}</p>"#, escape_html(s)))
        .unwrap_or_default();

    format!(
        r#"<article class="card"><a href="{href}"><img src="{img}" alt="{alt}" loading="lazy"></a><div class="card-body"><h3><a href="{href}">{title}</a></h3>{business}{summary}<p class="card-meta">{county}<span class="card-price">{price}</span></p><div class="tags">{tags}</div></div></article>"#,
        img = escape_html(primary_image_url(&listing.images)),
        alt = escape_html(&e.title),
        title = escape_html(&e.title),
        price = escape_html(&format_price(e.price_min, e.price_max)),
    )
}

pub fn nav(ctx: &PageContext) -> String {
    let links: &[(&str, &str)] = match ctx.nav {
        NavVariant::Guest => &[
            ("/", "Find experiences"),
            ("/experiences", "Browse"),
            ("/login", "Sign in"),
            ("/signup", "Join"),
        ],
        NavVariant::User => &[
            ("/", "Find experiences"),
            ("/experiences", "Browse"),
            ("/favorites", "My favorites"),
        ],
        NavVariant::Business => &[
            ("/", "Find experiences"),
            ("/experiences", "Browse"),
            ("/business", "Business dashboard"),
        ],
    };

    let mut items: String = links
        .iter()
        .map(|(href, label)| format!(r#"<li><a href="{href}">{label}</a></li>"#))
        .collect();
    if ctx.is_admin() {
        items.push_str(r#"<li><a href="/admin">Admin</a></li>"#);
    }
    if ctx.user.is_some() {
        items.push_str(
            r#"<li><form method="post" action="/logout" class="inline"><button type="submit" class="link">Sign out</button></form></li>"#,
        );
    }

    let variant = match ctx.nav {
        NavVariant::Guest => "guest",
        NavVariant::User => "user",
        NavVariant::Business => "business",
    };
    format!(r#"<nav class="site-nav" data-nav="{variant}"><a class="brand" href="/">Experience Finder</a><ul>{items}</ul></nav>"#)
}

const STYLES: &str = "body{font-family:system-ui,sans-serif;margin:0;color:#1d2b2a}\
main{max-width:1100px;margin:0 auto;padding:1.5rem}\
.site-nav{display:flex;justify-content:space-between;align-items:center;padding:.75rem 1.5rem;background:#0f4c45;color:#fff}\
.site-nav a,.site-nav .link{color:#fff;text-decoration:none;background:none;border:0;cursor:pointer;font:inherit}\
.site-nav ul{display:flex;gap:1rem;list-style:none;margin:0;padding:0}\
.results-grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(240px,1fr));gap:1rem}\
.card{border:1px solid #d8e2e0;border-radius:8px;overflow:hidden}\
.card img{width:100%;height:160px;object-fit:cover}.card-body{padding:.75rem}\
.tag{display:inline-block;font-size:.75rem;background:#e6f2f0;border-radius:4px;padding:0 .4rem;margin-right:.25rem}\
.alert{display:flex;justify-content:space-between;padding:.75rem 1rem;border-radius:6px;margin-bottom:1rem}\
.alert-info{background:#e8f1fb}.alert-success{background:#e5f6ea}.alert-error{background:#fbe9e9}\
.alert-close{background:none;border:0;font-size:1.2rem;cursor:pointer}\
.results-state{padding:2rem;text-align:center;color:#56706c}\
table{width:100%;border-collapse:collapse}td,th{padding:.4rem;border-bottom:1px solid #e3ebe9;text-align:left}\
form.inline{display:inline}";

pub fn layout(ctx: &PageContext, title: &str, flash: Option<&Alert>, body: &str) -> String {
    let flash = flash.map(alert).unwrap_or_default();
    format!(
        r#"<!DOCTYPE html><html lang="en"><head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>{title} · Experience Finder</title><style>{STYLES}</style></head><body>{nav}<main>{flash}{body}</main><footer class="site-footer"><main><small>Experience Finder</small></main></footer></body></html>"#,
        title = escape_html(title),
        nav = nav(ctx),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthUser;
    use crate::models::{Experience, ExperienceStatus, Role};

    fn image(url: &str, is_primary: bool, display_order: i32) -> ExperienceImage {
        ExperienceImage {
            id: Uuid::new_v4(),
            experience_id: Uuid::nil(),
            url: url.to_string(),
            storage_path: None,
            is_primary,
            display_order,
        }
    }

    fn listing(title: &str) -> ExperienceListing {
        ExperienceListing {
            experience: Experience {
                id: Uuid::new_v4(),
                business_id: None,
                title: title.to_string(),
                short_description: None,
                long_description: None,
                county: Some("Cork".into()),
                price_min: Some(40.0),
                price_max: None,
                status: ExperienceStatus::Approved,
                is_published: true,
                booking_url: None,
                duration: None,
                created_at: None,
            },
            business: None,
            images: Vec::new(),
            category_ids: vec![1],
        }
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn card_renders_hostile_titles_as_text() {
        let html = experience_card(&listing(r#"<img src=x onerror="boom"> & 'co'"#), None);
        assert!(!html.contains("<img src=x"));
        assert!(html.contains("&lt;img src=x onerror=&quot;boom&quot;&gt; &amp; &#39;co&#39;"));
    }

    #[test]
    fn primary_image_prefers_flag_then_order_then_placeholder() {
        let flagged = vec![image("b.jpg", false, 0), image("a.jpg", true, 5)];
        assert_eq!(primary_image_url(&flagged), "a.jpg");

        let ordered = vec![image("late.jpg", false, 3), image("early.jpg", false, 1)];
        assert_eq!(primary_image_url(&ordered), "early.jpg");

        assert_eq!(primary_image_url(&[]), PLACEHOLDER_IMAGE);
        assert_eq!(primary_image_url(&[image("  ", true, 0)]), PLACEHOLDER_IMAGE);
    }

    #[test]
    fn price_follows_three_way_rule() {
        assert_eq!(format_price(Some(50.0), Some(120.0)), "€50 – €120");
        assert_eq!(format_price(Some(49.5), None), "From €49.50");
        assert_eq!(format_price(None, None), "Price TBD");
        assert_eq!(format_price(None, Some(80.0)), "Price TBD");
    }

    #[test]
    fn result_states_are_distinct() {
        let items = vec![listing("Kayak")];
        let rendered = [
            results(ResultsState::Loading, None),
            results(ResultsState::Empty, None),
            results(ResultsState::Error, None),
            results(ResultsState::Results(&items), None),
        ];
        assert!(rendered[0].contains(LOADING_MESSAGE));
        assert!(rendered[1].contains(EMPTY_MESSAGE));
        assert!(rendered[2].contains(ERROR_MESSAGE));
        assert!(rendered[3].contains("Kayak"));
        for (i, a) in rendered.iter().enumerate() {
            for b in rendered.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn card_links_carry_source_tag() {
        let item = listing("Kayak");
        let html = experience_card(&item, Some("newsletter"));
        assert!(html.contains(&format!("/experiences/{}?source=newsletter", item.experience.id)));
    }

    #[test]
    fn nav_matches_role() {
        let guest = nav(&PageContext::guest());
        assert!(guest.contains(r#"data-nav="guest""#));
        assert!(guest.contains("/login"));

        let admin = nav(&PageContext::signed_in(
            AuthUser { id: Uuid::new_v4(), email: None },
            "tok".into(),
            Role::Admin,
        ));
        assert!(admin.contains(r#"data-nav="business""#));
        assert!(admin.contains("/admin"));
        assert!(!admin.contains("/login"));
    }
}
