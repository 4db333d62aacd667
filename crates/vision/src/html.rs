//! Embedded viewer page served at `/`.
//!
//! Kept as a `&'static str` so the binary needs no asset directory.

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>posewatch</title>
<style>
  :root { color-scheme: dark; }
  body { margin: 0; font-family: system-ui, sans-serif; background: #111; color: #ddd; }
  header { padding: 12px 20px; background: #1b1b1b; display: flex; gap: 16px; align-items: center; }
  header h1 { font-size: 18px; margin: 0; flex: 1; }
  main { display: grid; grid-template-columns: minmax(0, 3fr) minmax(260px, 1fr); gap: 16px; padding: 16px; }
  #video { width: 100%; border-radius: 6px; background: #000; }
  section { background: #1b1b1b; border-radius: 6px; padding: 12px; margin-bottom: 16px; }
  h2 { font-size: 14px; text-transform: uppercase; letter-spacing: .08em; margin: 0 0 8px; color: #999; }
  .alert { padding: 6px 8px; margin: 4px 0; border-left: 4px solid; background: #222; }
  .plugin { display: flex; justify-content: space-between; align-items: center; padding: 6px 0; border-bottom: 1px solid #262626; }
  .plugin small { display: block; color: #888; }
  dl { display: grid; grid-template-columns: auto 1fr; gap: 4px 12px; margin: 0; }
  dt { color: #888; }
  button { background: #2a2a2a; color: #ddd; border: 1px solid #444; border-radius: 4px; padding: 4px 10px; cursor: pointer; }
  button.on { background: #1f5f2f; border-color: #2f8f4f; }
  .bad { color: #f66; }
</style>
</head>
<body>
<header>
  <h1>posewatch</h1>
  <button onclick="toggleAll(true)">Enable all</button>
  <button onclick="toggleAll(false)">Disable all</button>
  <button onclick="capture()">Capture</button>
  <button onclick="shutdown()">Stop</button>
</header>
<main>
  <div><img id="video" src="/video" alt="live stream"></div>
  <div>
    <section><h2>Alerts</h2><div id="alerts"></div></section>
    <section><h2>Status</h2><dl id="status"></dl></section>
    <section><h2>Plugins</h2><div id="plugins"></div></section>
  </div>
</main>
<script>
const post = (url, body) => fetch(url, {
  method: 'POST',
  headers: {'Content-Type': 'application/json'},
  body: JSON.stringify(body || {})
}).then(r => r.json());

function rgb(c) { return `rgb(${c[0]},${c[1]},${c[2]})`; }

async function refreshStatus() {
  try {
    const data = await (await fetch('/status')).json();
    const alerts = document.getElementById('alerts');
    alerts.innerHTML = '';
    data.messages.forEach((msg, i) => {
      const div = document.createElement('div');
      div.className = 'alert';
      div.style.borderColor = rgb(data.colors[i]);
      div.textContent = msg;
      alerts.appendChild(div);
    });
    const s = data.status || {};
    const rows = [
      ['Running', data.running ? 'yes' : 'no'],
      ['Camera', data.camera],
      ['Pipeline', data.pipeline],
      ['Frame', s.frame_count ?? '-'],
      ['FPS', s.fps !== undefined ? s.fps.toFixed(1) : '-'],
      ['Person', s.person_detected ? 'yes' : 'no'],
      ['Hands', s.hands_detected ? 'yes' : 'no'],
      ['Device', s.device ?? '-'],
      ['Resolution', s.resolution ?? '-'],
      ['Model', s.model_loaded ? 'loaded' : 'not loaded'],
    ];
    document.getElementById('status').innerHTML = rows
      .map(([k, v]) => `<dt>${k}</dt><dd class="${v === 'disconnected' || String(v).startsWith('stalled') ? 'bad' : ''}">${v}</dd>`)
      .join('');
  } catch (e) { /* server restarting */ }
}

async function refreshPlugins() {
  try {
    const data = await (await fetch('/plugins')).json();
    const list = document.getElementById('plugins');
    list.innerHTML = '';
    data.plugins.forEach(p => {
      const row = document.createElement('div');
      row.className = 'plugin';
      const needs = [p.requires_keypoints && 'pose', p.requires_hands && 'hands'].filter(Boolean).join(', ');
      row.innerHTML = `<div>${p.display_name}<small>${p.description}${needs ? ' (' + needs + ')' : ''}</small></div>`;
      const btn = document.createElement('button');
      btn.textContent = p.enabled ? 'ON' : 'OFF';
      btn.className = p.enabled ? 'on' : '';
      btn.onclick = () => post('/plugins/toggle', {plugin_id: p.id}).then(refreshPlugins);
      row.appendChild(btn);
      list.appendChild(row);
    });
  } catch (e) { /* server restarting */ }
}

function toggleAll(enable) { post('/plugins/toggle_all', {enable}).then(refreshPlugins); }
function capture() {
  fetch('/capture').then(r => r.json()).then(d => alert(d.success ? `Saved ${d.filename}` : 'No frame to capture yet'));
}
function shutdown() { post('/shutdown').then(refreshStatus); }

setInterval(refreshStatus, 500);
setInterval(refreshPlugins, 2000);
refreshStatus();
refreshPlugins();
</script>
</body>
</html>
"#;
