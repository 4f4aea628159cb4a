use uuid::Uuid;

use super::{
    escape_html, format_price, layout, primary_image_url, results, Alert, ResultsState,
};
use crate::context::PageContext;
use crate::filters::{category_label, BudgetBucket, FilterSelection, CATEGORIES, COUNTIES};
use crate::models::{
    is_web_url, Business, BusinessProfileForm, ExperienceForm, ExperienceImage, ExperienceListing,
    ExperienceStatus, MetricsSeries, StatusCounts,
};

fn option(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{}"{}>{}</option>"#,
        escape_html(value),
        if selected { " selected" } else { "" },
        escape_html(label)
    )
}

fn category_options(selected: Option<i64>, placeholder: &str) -> String {
    let mut html = option("", placeholder, selected.is_none());
    for category in CATEGORIES {
        html.push_str(&option(
            &category.id.to_string(),
            category.label,
            selected == Some(category.id),
        ));
    }
    html
}

fn county_options(selected: Option<&str>, placeholder: &str) -> String {
    let mut html = option("", placeholder, selected.is_none());
    for county in COUNTIES {
        html.push_str(&option(county, county, selected == Some(*county)));
    }
    html
}

fn budget_options(selected: Option<BudgetBucket>) -> String {
    let mut html = option("", "Any budget", selected.is_none());
    for bucket in BudgetBucket::ALL {
        html.push_str(&option(bucket.as_str(), bucket.label(), selected == Some(bucket)));
    }
    html
}

fn text_value(value: Option<&str>) -> String {
    escape_html(value.unwrap_or_default())
}

fn number_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// The category/county/budget/text form shared by the finder, search and
/// admin pages.
pub fn filter_form(action: &str, selection: &FilterSelection, extra_fields: &str) -> String {
    let source = selection
        .source
        .as_deref()
        .map(|s| format!(r#"<input type="hidden" name="source" value="{}">"#, escape_html(s)))
        .unwrap_or_default();
    format!(
        r#"<form class="filters" method="get" action="{action}"><input type="search" name="q" placeholder="Search experiences" value="{q}"><select name="category">{categories}</select><select name="county">{counties}</select><select name="budget">{budgets}</select>{extra_fields}{source}<button type="submit">Apply filters</button></form>"#,
        action = escape_html(action),
        q = text_value(selection.text.as_deref()),
        categories = category_options(selection.category_id, "Any type"),
        counties = county_options(selection.county.as_deref(), "Any county"),
        budgets = budget_options(selection.budget),
    )
}

// ============================================================================
// PUBLIC PAGES
// ============================================================================

/// Finder landing page. Featured results load into the container after the
/// page is shown.
pub fn home(ctx: &PageContext, selection: &FilterSelection) -> String {
    let query = selection.to_query_string();
    let suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    let body = format!(
        r#"<section class="hero"><h1>Find your next experience</h1><p>Tours, classes and adventures from local businesses.</p>{form}</section><section><h2>Featured experiences</h2><div id="results" data-src="{src}">{loading}</div><noscript><p><a href="{browse}">Browse all experiences</a></p></noscript></section><script>(function(){{var el=document.getElementById('results');fetch(el.dataset.src).then(function(r){{if(!r.ok)throw new Error(r.status);return r.text();}}).then(function(html){{el.innerHTML=html;}}).catch(function(){{el.innerHTML='{error}';}});}})();</script>"#,
        form = filter_form("/experiences", selection, ""),
        src = escape_html(&format!("/experiences/results{suffix}")),
        browse = escape_html(&format!("/experiences{suffix}")),
        loading = results(ResultsState::Loading, None),
        error = results(ResultsState::Error, None).replace('\'', "\\'"),
    );
    layout(ctx, "Find experiences", None, &body)
}

pub fn experiences_page(
    ctx: &PageContext,
    selection: &FilterSelection,
    state: ResultsState<'_>,
) -> String {
    let count = match state {
        ResultsState::Results(listings) => format!(
            r#"<p class="result-count">{} experience{}</p>"#,
            listings.len(),
            if listings.len() == 1 { "" } else { "s" }
        ),
        _ => String::new(),
    };
    let body = format!(
        r#"<h1>Experiences</h1>{form}{count}<div id="results">{results}</div>"#,
        form = filter_form("/experiences", selection, ""),
        results = results(state, selection.source.as_deref()),
    );
    layout(ctx, "Experiences", None, &body)
}

fn gallery(images: &[ExperienceImage]) -> String {
    if images.len() < 2 {
        return String::new();
    }
    let mut sorted: Vec<&ExperienceImage> = images.iter().collect();
    sorted.sort_by_key(|i| i.display_order);
    let items: String = sorted
        .iter()
        .map(|i| format!(r#"<img src="{}" alt="" loading="lazy">"#, escape_html(&i.url)))
        .collect();
    format!(r#"<div class="gallery">{items}</div>"#)
}

pub fn experience_detail(
    ctx: &PageContext,
    listing: &ExperienceListing,
    favorited: bool,
    source: Option<&str>,
) -> String {
    let e = &listing.experience;
    let business = listing
        .business
        .as_ref()
        .map(|b| {
            let website = b
                .website
                .as_deref()
                .filter(|w| is_web_url(w))
                .map(|w| {
                    format!(
                        r#" · <a href="{}" rel="noopener" target="_blank">Website</a>"#,
                        escape_html(w)
                    )
                })
                .unwrap_or_default();
            format!(r#"<p class="business">Hosted by {}{website}</p>"#, escape_html(&b.name))
        })
        .unwrap_or_default();
    let tags: String = listing
        .category_ids
        .iter()
        .map(|id| format!(r#"<span class="tag">{}</span>"#, escape_html(category_label(*id))))
        .collect();
    let duration = e
        .duration
        .as_deref()
        .map(|d| format!("<li>Duration: {}</li>", escape_html(d)))
        .unwrap_or_default();
    let county = e
        .county
        .as_deref()
        .map(|c| format!("<li>County: {}</li>", escape_html(c)))
        .unwrap_or_default();
    let description = e
        .long_description
        .as_deref()
        .or(e.short_description.as_deref())
        .map(|d| format!(r#"<div class="description"><p>{}</p></div>"#, escape_html(d)))
        .unwrap_or_default();

    let booking = if e.booking_url.as_deref().is_some_and(is_web_url) {
        let href = match source {
            Some(source) => format!(
                "/experiences/{}/book?{}",
                e.id,
                crate::filters::encode_pairs(&[("source", source.to_string())])
            ),
            None => format!("/experiences/{}/book", e.id),
        };
        format!(
            r#"<a class="button primary" href="{}" rel="noopener">Book now</a>"#,
            escape_html(&href)
        )
    } else {
        r#"<p class="muted">Booking details coming soon.</p>"#.to_string()
    };

    let favorite = if ctx.user.is_some() {
        format!(
            r#"<form method="post" action="/favorites/{id}/toggle" class="inline"><button type="submit">{label}</button></form>"#,
            id = e.id,
            label = if favorited { "♥ Saved" } else { "♡ Save" },
        )
    } else {
        r#"<a href="/login">Sign in to save</a>"#.to_string()
    };

    let body = format!(
        r#"<article class="experience"><img class="hero-image" src="{img}" alt="{alt}"><h1>{title}</h1>{business}<div class="tags">{tags}</div><p class="price">{price}</p><ul class="facts">{county}{duration}</ul>{description}{gallery}<div class="actions">{booking} {favorite}</div></article>"#,
        img = escape_html(primary_image_url(&listing.images)),
        alt = escape_html(&e.title),
        title = escape_html(&e.title),
        price = escape_html(&format_price(e.price_min, e.price_max)),
        gallery = gallery(&listing.images),
    );
    layout(ctx, &e.title, None, &body)
}

pub fn favorites_page(ctx: &PageContext, state: ResultsState<'_>, flash: Option<&Alert>) -> String {
    let body = match state {
        ResultsState::Empty => format!(
            r#"<h1>My favorites</h1><div class="results-state results-empty">You haven't saved any experiences yet. <a href="/experiences">Start browsing</a>.</div>"#
        ),
        other => format!(r#"<h1>My favorites</h1>{}"#, results(other, None)),
    };
    layout(ctx, "My favorites", flash, &body)
}

pub fn error_page(ctx: &PageContext, message: &str) -> String {
    let body = format!(
        r#"<section class="error"><h1>Sorry</h1><p>{}</p><p><a href="/">Back to the finder</a></p></section>"#,
        escape_html(message)
    );
    layout(ctx, "Something went wrong", None, &body)
}

// ============================================================================
// AUTH PAGES
// ============================================================================

pub fn login_page(
    ctx: &PageContext,
    flash: Option<&Alert>,
    email: Option<&str>,
    next: Option<&str>,
) -> String {
    let next = next
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, escape_html(n)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Sign in</h1><form method="post" action="/login" class="stacked"><label>Email <input type="email" name="email" required value="{email}"></label><label>Password <input type="password" name="password" required></label>{next}<button type="submit">Sign in</button></form><p>New here? <a href="/signup">Create an account</a>.</p>"#,
        email = text_value(email),
    );
    layout(ctx, "Sign in", flash, &body)
}

pub fn signup_page(
    ctx: &PageContext,
    flash: Option<&Alert>,
    email: Option<&str>,
    account_type: Option<&str>,
) -> String {
    let business = account_type == Some("business");
    let body = format!(
        r#"<h1>Create an account</h1><form method="post" action="/signup" class="stacked"><label>Email <input type="email" name="email" required value="{email}"></label><label>Password <input type="password" name="password" minlength="8" required></label><label>Confirm password <input type="password" name="confirm_password" minlength="8" required></label><label>Account type <select name="account_type">{user}{biz}</select></label><button type="submit">Create account</button></form><p>Already registered? <a href="/login">Sign in</a>.</p>"#,
        email = text_value(email),
        user = option("user", "I'm looking for experiences", !business),
        biz = option("business", "I run a business", business),
    );
    layout(ctx, "Create an account", flash, &body)
}

// ============================================================================
// BUSINESS DASHBOARD
// ============================================================================

pub struct BusinessDashboard<'a> {
    pub business: Option<&'a Business>,
    pub listings: &'a [ExperienceListing],
    pub series: Option<&'a MetricsSeries>,
    pub profile: &'a BusinessProfileForm,
}

fn status_badge(status: ExperienceStatus) -> String {
    format!(
        r#"<span class="badge badge-{}">{}</span>"#,
        status.as_str(),
        status.label()
    )
}

fn profile_form(profile: &BusinessProfileForm) -> String {
    format!(
        r#"<form method="post" action="/business/profile" class="stacked"><label>Business name <input name="name" required value="{name}"></label><label>Website <input type="url" name="website" value="{website}"></label><label>Logo URL <input type="url" name="logo_url" value="{logo}"></label><label>Description <textarea name="description" rows="4">{description}</textarea></label><button type="submit">Save profile</button></form>"#,
        name = escape_html(&profile.name),
        website = text_value(profile.website.as_deref()),
        logo = text_value(profile.logo_url.as_deref()),
        description = text_value(profile.description.as_deref()),
    )
}

fn metrics_panel(series: Option<&MetricsSeries>) -> String {
    match series {
        Some(series) => {
            let data = serde_json::to_string(series).unwrap_or_else(|_| "{}".to_string());
            format!(
                r#"<section class="metrics"><h2>Last {days} days</h2><p><strong>{views}</strong> views · <strong>{clicks}</strong> booking clicks</p><canvas id="metrics-chart" data-series="{data}" height="120"></canvas><script src="https://cdn.jsdelivr.net/npm/chart.js"></script><script>(function(){{var c=document.getElementById('metrics-chart');var s=JSON.parse(c.dataset.series);if(!window.Chart)return;new Chart(c,{{type:'line',data:{{labels:s.labels,datasets:[{{label:'Views',data:s.views}},{{label:'Booking clicks',data:s.booking_clicks}}]}}}});}})();</script></section>"#,
                days = series.labels.len(),
                views = series.total_views,
                clicks = series.total_booking_clicks,
                data = escape_html(&data),
            )
        }
        None => r#"<section class="metrics"><h2>Performance</h2><p class="muted">Metrics are unavailable right now.</p></section>"#.to_string(),
    }
}

fn business_rows(listings: &[ExperienceListing]) -> String {
    if listings.is_empty() {
        return r#"<p class="results-state results-empty">You haven't added any experiences yet.</p>"#
            .to_string();
    }
    let rows: String = listings
        .iter()
        .map(|l| {
            let e = &l.experience;
            format!(
                r#"<tr><td><img src="{img}" alt="" width="64"></td><td>{title}</td><td>{status}</td><td>{price}</td><td><a href="/business/experiences/{id}/edit">Edit</a> <form method="post" action="/business/experiences/{id}/delete" class="inline" onsubmit="return confirm('Delete this experience? This cannot be undone.');"><button type="submit">Delete</button></form></td></tr>"#,
                img = escape_html(primary_image_url(&l.images)),
                title = escape_html(&e.title),
                status = status_badge(e.status),
                price = escape_html(&format_price(e.price_min, e.price_max)),
                id = e.id,
            )
        })
        .collect();
    format!(
        r#"<table><thead><tr><th></th><th>Title</th><th>Status</th><th>Price</th><th></th></tr></thead><tbody>{rows}</tbody></table>"#
    )
}

pub fn business_dashboard(
    ctx: &PageContext,
    dashboard: &BusinessDashboard<'_>,
    flash: Option<&Alert>,
) -> String {
    let heading = dashboard
        .business
        .map(|b| escape_html(&b.name))
        .unwrap_or_else(|| "Set up your business".to_string());

    let experiences = if dashboard.business.is_some() {
        format!(
            r#"<section><h2>Your experiences</h2><p><a class="button" href="/business/experiences/new">Add experience</a></p>{}</section>"#,
            business_rows(dashboard.listings)
        )
    } else {
        r#"<p class="muted">Save your business profile to start listing experiences.</p>"#.to_string()
    };

    let metrics = if dashboard.business.is_some() {
        metrics_panel(dashboard.series)
    } else {
        String::new()
    };

    let body = format!(
        r#"<h1>{heading}</h1>{metrics}{experiences}<section><h2>Business profile</h2>{profile}</section>"#,
        profile = profile_form(dashboard.profile),
    );
    layout(ctx, "Business dashboard", flash, &body)
}

fn image_manager(experience_id: Uuid, images: &[ExperienceImage]) -> String {
    let items: String = images
        .iter()
        .map(|image| {
            let action = if image.is_primary {
                r#"<span class="badge">Primary</span>"#.to_string()
            } else {
                format!(
                    r#"<form method="post" action="/business/experiences/{experience_id}/images/{id}/primary" class="inline"><button type="submit">Make primary</button></form>"#,
                    id = image.id
                )
            };
            format!(
                r#"<li><img src="{}" alt="" width="96"> {action}</li>"#,
                escape_html(&image.url)
            )
        })
        .collect();
    format!(
        r#"<section class="images"><h2>Images</h2><ul class="image-list">{items}</ul><input type="file" id="image-upload" accept="image/*"><script>(function(){{var input=document.getElementById('image-upload');input.addEventListener('change',function(){{var f=input.files[0];if(!f)return;fetch('/business/experiences/{experience_id}/images?filename='+encodeURIComponent(f.name),{{method:'POST',headers:{{'Content-Type':f.type}},body:f}}).then(function(r){{if(r.ok){{location.reload();}}else{{alert('Upload failed. Please try again.');}}}});}});}})();</script></section>"#
    )
}

pub fn experience_form_page(
    ctx: &PageContext,
    form: &ExperienceForm,
    editing: Option<(Uuid, &[ExperienceImage])>,
    flash: Option<&Alert>,
) -> String {
    let (heading, action) = match editing {
        Some((id, _)) => ("Edit experience", format!("/business/experiences/{id}")),
        None => ("New experience", "/business/experiences".to_string()),
    };
    let images = editing
        .map(|(id, images)| image_manager(id, images))
        .unwrap_or_default();

    let body = format!(
        r#"<h1>{heading}</h1><form method="post" action="{action}" class="stacked"><label>Title <input name="title" required value="{title}"></label><label>Short description <input name="short_description" maxlength="280" value="{short}"></label><label>Full description <textarea name="long_description" rows="6">{long}</textarea></label><label>Type <select name="category_id">{categories}</select></label><label>County <select name="county" required>{counties}</select></label><label>Minimum price (€) <input type="number" min="0" step="0.01" name="price_min" value="{min}"></label><label>Maximum price (€) <input type="number" min="0" step="0.01" name="price_max" value="{max}"></label><label>Duration <input name="duration" value="{duration}"></label><label>Booking link <input type="url" name="booking_url" value="{booking}"></label><label><input type="checkbox" name="submit_for_review"{checked}> Submit for review</label><button type="submit">Save</button></form>{images}"#,
        action = escape_html(&action),
        title = escape_html(&form.title),
        short = text_value(form.short_description.as_deref()),
        long = text_value(form.long_description.as_deref()),
        categories = category_options(form.category_id, "Choose a type"),
        counties = county_options(
            Some(form.county.as_str()).filter(|c| !c.is_empty()),
            "Choose a county"
        ),
        min = number_value(form.price_min),
        max = number_value(form.price_max),
        duration = text_value(form.duration.as_deref()),
        booking = text_value(form.booking_url.as_deref()),
        checked = if form.submit_for_review { " checked" } else { "" },
    );
    layout(ctx, heading, flash, &body)
}

// ============================================================================
// ADMIN DASHBOARD
// ============================================================================

fn admin_rows(listings: &[ExperienceListing]) -> String {
    listings
        .iter()
        .map(|l| {
            let e = &l.experience;
            let business = l
                .business
                .as_ref()
                .map(|b| escape_html(&b.name))
                .unwrap_or_else(|| "Unknown".to_string());
            let review = if e.status == ExperienceStatus::Approved {
                String::new()
            } else {
                format!(
                    r#"<form method="post" action="/admin/experiences/{id}/approve" class="inline"><button type="submit">Approve</button></form> "#,
                    id = e.id
                )
            };
            let reject = if e.status == ExperienceStatus::Rejected {
                String::new()
            } else {
                format!(
                    r#"<form method="post" action="/admin/experiences/{id}/reject" class="inline" onsubmit="return confirm('Reject this experience?');"><button type="submit">Reject</button></form> "#,
                    id = e.id
                )
            };
            format!(
                r#"<tr><td><a href="/experiences/{id}">{title}</a></td><td>{business}</td><td>{status}</td><td>{price}</td><td>{review}{reject}<form method="post" action="/admin/experiences/{id}/delete" class="inline" onsubmit="return confirm('Delete this experience permanently?');"><button type="submit">Delete</button></form></td></tr>"#,
                id = e.id,
                title = escape_html(&e.title),
                status = status_badge(e.status),
                price = escape_html(&format_price(e.price_min, e.price_max)),
            )
        })
        .collect()
}

pub fn admin_dashboard(
    ctx: &PageContext,
    counts: Option<&StatusCounts>,
    selection: &FilterSelection,
    status: Option<ExperienceStatus>,
    state: ResultsState<'_>,
    flash: Option<&Alert>,
) -> String {
    let stats = match counts {
        Some(c) => format!(
            r#"<ul class="stats"><li>Draft: {}</li><li>Pending: {}</li><li>Approved: {}</li><li>Rejected: {}</li></ul>"#,
            c.draft, c.pending, c.approved, c.rejected
        ),
        None => r#"<p class="muted">Counts are unavailable right now.</p>"#.to_string(),
    };

    let mut status_select = option("", "Any status", status.is_none());
    for s in ExperienceStatus::ALL {
        status_select.push_str(&option(s.as_str(), s.label(), status == Some(s)));
    }
    let extra = format!(r#"<select name="status">{status_select}</select>"#);

    let table = match state {
        ResultsState::Results(listings) => format!(
            r#"<table><thead><tr><th>Title</th><th>Business</th><th>Status</th><th>Price</th><th></th></tr></thead><tbody>{}</tbody></table>"#,
            admin_rows(listings)
        ),
        other => results(other, None),
    };

    let body = format!(
        r#"<h1>Admin</h1>{stats}{form}{table}"#,
        form = filter_form("/admin", selection, &extra),
    );
    layout(ctx, "Admin", flash, &body)
}
