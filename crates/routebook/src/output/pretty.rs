//! Pretty output formatting.

use super::{ChangeView, RouteList, RouteView, UserView};
use crate::mock_data::SeedSummary;

fn format_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}

/// Format a user for display.
pub fn format_user(user: &UserView) -> String {
    format!(
        "{}\n  ID: {}\n  Email: {}\n  Following: {}\n  Followers: {}\n  Liked routes: {}",
        user.display_name,
        user.id,
        user.email,
        format_ids(&user.following),
        format_ids(&user.followers),
        format_ids(&user.liked_routes)
    )
}

/// Format a route for display.
pub fn format_route(route: &RouteView) -> String {
    let setter = route.setter.as_deref().unwrap_or("unknown");
    format!(
        "{} [{}]\n  ID: {}\n  Setter: {}\n  Created: {}\n  Likes: {}",
        route.name,
        route.grade,
        route.id,
        setter,
        route.created_at.format("%Y-%m-%d %H:%M"),
        route.likes
    )
}

/// Format a page of routes for display.
pub fn format_routes(list: &RouteList) -> String {
    if list.routes.is_empty() {
        return "No routes found.".to_string();
    }
    let mut output = format!("{} ({})\n", list.title.to_uppercase(), list.routes.len());
    output.push_str(&"-".repeat(40));
    for route in &list.routes {
        output.push_str(&format!("\n{}", format_route(route)));
        output.push('\n');
    }
    if list.more {
        output.push_str("\n(more routes available, raise --limit to see them)");
    }
    output
}

/// Format a relationship change for display.
pub fn format_change(change: &ChangeView) -> String {
    let target = match &change.object {
        Some(object) => format!("{} {} {}", change.subject, change.action, object),
        None => format!("{} {}", change.action, change.subject),
    };
    if change.changed {
        format!("Done: {target}")
    } else {
        format!("Nothing to do: {target}")
    }
}

/// Format a seed summary for display.
pub fn format_seed(summary: &SeedSummary) -> String {
    format!(
        "Seeded {} users, {} routes, {} follows and {} likes.",
        summary.users, summary.routes, summary.follows, summary.likes
    )
}
