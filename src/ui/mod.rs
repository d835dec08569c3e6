//! Web UI - playlist selection and command queue
//!
//! Server-rendered HTML with Pico CSS (classless), plus a few lines of JS that
//! post to the JSON API and tail `/events` for the radio display.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::api::AppState;
use crate::spotify::types::Playlist;
use crate::spotify::SpotifyError;

/// How many of the user's playlists the page lists
const PLAYLIST_PAGE_LIMIT: u32 = 50;

/// Minimal HTML escaping for text and attribute values
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML document wrapper with Pico CSS
fn html_doc(title: &str, content: &str) -> String {
    let title = escape(title);
    let version = crate::VERSION;
    format!(
        r#"<!DOCTYPE html>
<html lang="en" data-theme="dark">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - Radio Control</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/@picocss/pico@2/css/pico.min.css">
    <style>
        :root {{ --pico-font-size: 15px; }}
        .status-ok {{ color: var(--pico-ins-color); }}
        .status-err {{ color: var(--pico-del-color); }}
        .playlist-grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(280px, 1fr)); gap: 0.25rem 1rem; }}
        #display {{ font-family: monospace; min-height: 1.5em; }}
        small {{ color: var(--pico-muted-color); }}
    </style>
</head>
<body>
    <header class="container">
        <nav>
            <ul><li><strong>Radio Control</strong></li></ul>
            <ul><li><a href="/playlists">Playlists</a></li><li><a href="/status">Status</a></li></ul>
        </nav>
    </header>
    <main class="container">
        {content}
    </main>
    <footer class="container">
        <small>Radio Control v{version}</small>
    </footer>
</body>
</html>"#
    )
}

fn playlist_row(playlist: &Playlist, selected: &[String]) -> String {
    let checked = if selected.iter().any(|uri| uri == &playlist.uri) {
        " checked"
    } else {
        ""
    };
    let tracks = playlist.tracks.as_ref().map(|t| t.total).unwrap_or(0);
    format!(
        r#"<label><input type="checkbox" name="playlist" value="{uri}"{checked}> {name} <small>({tracks} tracks)</small></label>"#,
        uri = escape(&playlist.uri),
        name = escape(&playlist.name),
    )
}

fn playlists_content(playlists: &[Playlist], selected: &[String], command: Option<&str>) -> String {
    let rows = playlists
        .iter()
        .map(|p| playlist_row(p, selected))
        .collect::<Vec<_>>()
        .join("\n");
    let pending = match command {
        Some(cmd) => format!(r#"Pending: <code>{}</code>"#, escape(cmd)),
        None => "No command pending".to_string(),
    };

    format!(
        r#"
<h1>Channels</h1>
<article>
    <p id="display"></p>
</article>

<form id="playlists-form">
    <div class="playlist-grid">
        {rows}
    </div>
    <button type="submit">Save playlists</button>
    <small id="playlists-result"></small>
</form>

<h2>Command</h2>
<form id="command-form">
    <fieldset role="group">
        <input type="text" name="command" placeholder="Shell command to run at the end of the track">
        <button type="submit">Queue</button>
    </fieldset>
    <small id="command-status">{pending}</small>
</form>

<script>
    const post = (url, body) => fetch(url, {{
        method: 'POST',
        headers: {{'Content-Type': 'application/json'}},
        body: JSON.stringify(body),
    }}).then(r => r.json().then(j => ({{ok: r.ok, body: j}})));

    document.getElementById('playlists-form').addEventListener('submit', e => {{
        e.preventDefault();
        const playlists = [...document.querySelectorAll('input[name=playlist]:checked')].map(i => i.value);
        post('/set_playlists', {{playlists}}).then(({{ok, body}}) => {{
            const el = document.getElementById('playlists-result');
            el.textContent = ok ? body.message : body.error;
            el.className = ok ? 'status-ok' : 'status-err';
        }});
    }});

    document.getElementById('command-form').addEventListener('submit', e => {{
        e.preventDefault();
        const input = e.target.elements.command;
        post('/set_command', {{command: input.value}}).then(({{ok, body}}) => {{
            const el = document.getElementById('command-status');
            el.textContent = ok ? 'Pending: ' + body.command : body.error;
            el.className = ok ? 'status-ok' : 'status-err';
            if (ok) input.value = '';
        }});
    }});

    const events = new EventSource('/events');
    events.onmessage = msg => {{
        const ev = JSON.parse(msg.data);
        if (ev.type === 'RadioDisplay') document.getElementById('display').textContent = ev.payload.message;
        if (ev.type === 'CommandCleared') document.getElementById('command-status').textContent = 'No command pending';
    }};
</script>
"#
    )
}

/// GET /playlists - Playlist picker and command form
pub async fn playlists_page(State(state): State<AppState>) -> Response {
    if !state.auth.is_authenticated().await {
        return Redirect::to("/login").into_response();
    }

    let playlists = match state
        .radio
        .client()
        .current_user_playlists(PLAYLIST_PAGE_LIMIT)
        .await
    {
        Ok(playlists) => playlists,
        Err(SpotifyError::NotAuthenticated) => return Redirect::to("/login").into_response(),
        Err(e) => {
            tracing::warn!("Failed to fetch playlists: {}", e);
            let content = format!(
                r#"<h1>Channels</h1><p class="status-err">Failed to load playlists: {}</p>"#,
                escape(&e.to_string())
            );
            return (StatusCode::BAD_GATEWAY, Html(html_doc("Error", &content))).into_response();
        }
    };

    let selected = state.channels.load();
    let command = state.commands.load();
    let content = playlists_content(&playlists, &selected, command.as_deref());
    Html(html_doc("Playlists", &content)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::types::PlaylistTracks;

    fn playlist(name: &str, uri: &str) -> Playlist {
        Playlist {
            id: uri.rsplit(':').next().unwrap_or(uri).to_string(),
            name: name.to_string(),
            uri: uri.to_string(),
            owner: None,
            tracks: Some(PlaylistTracks { total: 12 }),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn selected_playlists_are_checked() {
        let playlists = vec![
            playlist("Morning", "spotify:playlist:a"),
            playlist("Evening", "spotify:playlist:b"),
        ];
        let html = playlists_content(&playlists, &["spotify:playlist:b".to_string()], None);

        assert!(html.contains(r#"value="spotify:playlist:a">"#));
        assert!(html.contains(r#"value="spotify:playlist:b" checked>"#));
        assert!(html.contains("No command pending"));
    }

    #[test]
    fn pending_command_is_escaped() {
        let html = playlists_content(&[], &[], Some("echo <hi>"));
        assert!(html.contains("<code>echo &lt;hi&gt;</code>"));
    }

    #[test]
    fn document_wraps_content() {
        let doc = html_doc("Playlists", "<p>body</p>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>Playlists - Radio Control</title>"));
        assert!(doc.contains("<p>body</p>"));
    }
}
