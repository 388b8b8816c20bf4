//! Command execution.
//!
//! Each command returns its rendered output so `main` only has to print it.

use anyhow::Result;
use routebook_core::cursor::Cursor;
use routebook_core::Client;

use crate::cli::{Commands, OutputFormat};
use crate::mock_data;
use crate::output::{format_output, pretty, ChangeView, RouteList, RouteView, UserView};

/// Runs one command against `client` and renders the result.
pub async fn execute(command: Commands, client: &Client, format: OutputFormat) -> Result<String> {
    tracing::debug!(?command, "Executing command");

    let output = match command {
        Commands::Seed => {
            let summary = mock_data::seed(client).await?;
            format_output(&summary, format, pretty::format_seed)
        }
        Commands::User { id } => {
            let user = UserView::load(&client.user(id)).await?;
            format_output(&user, format, pretty::format_user)
        }
        Commands::Routes { setter, limit } => {
            let mut cursor = client.routes_by_setter(&client.user(setter.as_str()))?;
            let list = route_list(format!("Routes set by {setter}"), &mut cursor, limit).await?;
            format_output(&list, format, pretty::format_routes)
        }
        Commands::Recent { limit } => {
            let mut cursor = client.recent_routes();
            let list = route_list("Recent routes".to_string(), &mut cursor, limit).await?;
            format_output(&list, format, pretty::format_routes)
        }
        Commands::Feed { user, limit } => {
            let mut feed = client.feed(&client.user(user.as_str())).await?;
            let list = route_list(format!("Feed for {user}"), &mut feed, limit).await?;
            format_output(&list, format, pretty::format_routes)
        }
        Commands::Follow { user, target } => {
            let changed = client
                .user(user.as_str())
                .follow(&client.user(target.as_str()))
                .await?;
            render_change("follow", user, Some(target), changed, format)
        }
        Commands::Unfollow { user, target } => {
            let changed = client
                .user(user.as_str())
                .unfollow(&client.user(target.as_str()))
                .await?;
            render_change("unfollow", user, Some(target), changed, format)
        }
        Commands::Like { user, route } => {
            let changed = client
                .route(route.as_str())
                .like(&client.user(user.as_str()))
                .await?;
            render_change("like", user, Some(route), changed, format)
        }
        Commands::Unlike { user, route } => {
            let changed = client
                .route(route.as_str())
                .unlike(&client.user(user.as_str()))
                .await?;
            render_change("unlike", user, Some(route), changed, format)
        }
        Commands::DeleteRoute { route } => {
            let changed = client.route(route.as_str()).delete().await?;
            render_change("delete-route", route, None, changed, format)
        }
    };

    Ok(output)
}

/// Polls up to `limit` routes, then peeks once to tell whether more exist.
async fn route_list<C>(title: String, cursor: &mut C, limit: usize) -> Result<RouteList>
where
    C: Cursor<Item = routebook_core::model::Route>,
{
    let routes = cursor.next_page(limit).await?;
    let more = routes.len() == limit && cursor.has_next().await?;

    Ok(RouteList {
        title,
        routes: RouteView::load_all(&routes).await?,
        more,
    })
}

fn render_change(
    action: &'static str,
    subject: String,
    object: Option<String>,
    changed: bool,
    format: OutputFormat,
) -> String {
    let change = ChangeView {
        action,
        subject,
        object,
        changed,
    };
    format_output(&change, format, pretty::format_change)
}
