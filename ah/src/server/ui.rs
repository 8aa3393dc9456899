//! Built-in answer page, served when no UI asset directory is configured

use axum::response::Html;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>askhuman</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #111; color: #eee; }
  header { padding: 12px 20px; background: #1c1c1c; border-bottom: 1px solid #333; }
  main { padding: 20px; max-width: 900px; }
  .req { border: 1px solid #333; border-radius: 6px; padding: 12px; margin-bottom: 12px; }
  .meta { color: #999; font-size: 12px; margin-bottom: 6px; }
  .answer { color: #8fd18f; white-space: pre-wrap; }
  textarea { width: 100%; min-height: 60px; background: #000; color: #eee; border: 1px solid #444; }
  button { margin-top: 6px; }
</style>
</head>
<body>
<header><strong>askhuman</strong> <span id="source" class="meta"></span></header>
<main id="requests">Loading...</main>
<script>
const list = document.getElementById('requests');

function escape(text) {
  const div = document.createElement('div');
  div.textContent = text;
  return div.innerHTML;
}

async function respond(id) {
  const box = document.getElementById('answer-' + id);
  const res = await fetch('/api/requests/' + id + '/respond', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ response: box.value }),
  });
  if (!res.ok) {
    const body = await res.json().catch(() => ({ error: res.statusText }));
    alert(body.error);
  }
  load();
}

async function load() {
  const res = await fetch('/api/requests');
  if (!res.ok) return;
  const requests = await res.json();
  if (requests.length === 0) {
    list.textContent = 'No questions yet.';
    return;
  }
  list.innerHTML = requests.map((r) => `
    <div class="req">
      <div class="meta">#${r.id} &middot; ${escape(r.source_name)} / ${escape(r.app_name)} &middot; ${r.created_at}</div>
      <div>${escape(r.question)}</div>
      ${r.status === 'responded'
        ? `<div class="answer">${escape(r.response)}</div>`
        : `<textarea id="answer-${r.id}"></textarea><br><button onclick="respond(${r.id})">Answer</button>`}
    </div>`).join('');
}

fetch('/api/source').then((r) => r.json()).then((b) => {
  document.getElementById('source').textContent = b.source_name;
}).catch(() => {});

const events = new EventSource('/api/events');
events.addEventListener('new-request', load);
setInterval(load, 5000);
load();
</script>
</body>
</html>
"#;
