//! The single dashboard page. Panel data comes from `/api/panels` and is
//! drawn client side with Plotly.

pub const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Mini SIEM Dashboard</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  html, body { font-family: Arial, sans-serif; font-size: 20px; margin: 0 24px; }
  h1, h3.subtitle { text-align: center; }
  h3.subtitle { font-size: 26px; font-weight: normal; }
  .overview { background-color: #ffe6f2; border: 2px solid #ffb3d9; padding: 15px; border-radius: 12px;
              text-align: center; font-size: 28px; font-weight: bold; margin-bottom: 20px; color: black; }
  .row { display: flex; gap: 24px; }
  .col { flex: 1; min-width: 0; }
  .section-border { padding: 15px; border-radius: 12px; margin-bottom: 25px; }
  hr { border: none; border-top: 2px solid #ddd; margin: 25px 0; }
  .notice { padding: 12px 16px; border-radius: 8px; margin: 8px 0; }
  .info { background: #e8f0fe; }
  .success { background: #e6f4ea; }
  .warning { background: #fff4e5; }
  .error { background: #fdecea; }
  table { border-collapse: collapse; width: 100%; font-size: 16px; }
  th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
  th { background: #f6f6f6; }
  .meta { color: #888; font-size: 14px; }
</style>
</head>
<body>
<h1>Mini SIEM - VPC Flow Log Analysis</h1>
<h3 class="subtitle">A dashboard for monitoring and visualizing network anomalies.</h3>

<div class="overview">Live Traffic Overview</div>
<div class="row">
  <div class="col"><h2 id="traffic_status-title"></h2><div id="traffic_status"></div></div>
  <div class="col"><h2 id="top_talkers-title"></h2><div id="top_talkers"></div></div>
</div>

<hr>

<div class="section-border">
  <h2 id="traffic_over_time-title"></h2>
  <div id="traffic_over_time"></div>
</div>

<h2>Anomaly Detections</h2>
<div class="row">
  <div class="col"><h3 id="ddos_candidates-title"></h3><div id="ddos_candidates"></div></div>
  <div class="col"><h3 id="port_scan_candidates-title"></h3><div id="port_scan_candidates"></div></div>
</div>

<details>
  <summary>Show Recent Raw Logs</summary>
  <h3 id="recent_logs-title"></h3>
  <div id="recent_logs"></div>
</details>

<p class="meta" id="generated"></p>

<script>
function escapeHtml(text) {
  return String(text ?? '').replace(/[&<>"']/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));
}

function notice(kind, text) {
  return `<div class="notice ${kind}">${escapeHtml(text)}</div>`;
}

function tableHtml(table) {
  const head = '<tr>' + table.columns.map(c => `<th>${escapeHtml(c)}</th>`).join('') + '</tr>';
  const body = table.rows.map(r => '<tr>' + r.map(v => `<td>${escapeHtml(v)}</td>`).join('') + '</tr>').join('');
  return `<table><thead>${head}</thead><tbody>${body}</tbody></table>`;
}

function column(table, name) {
  const idx = table.columns.indexOf(name);
  return idx < 0 ? [] : table.rows.map(r => r[idx]);
}

const anomalyWarnings = {
  ddos_candidates: 'High connection frequency detected:',
  port_scan_candidates: 'Possible port scanning detected:',
};

function render(report) {
  const el = document.getElementById(report.panel);
  document.getElementById(report.panel + '-title').textContent = report.title;
  if (report.status === 'error') { el.innerHTML = notice('error', report.message); return; }

  const isAnomaly = report.panel in anomalyWarnings;
  if (report.status === 'empty') {
    el.innerHTML = notice(isAnomaly ? 'success' : 'info', report.message);
    return;
  }

  const t = report.table;
  switch (report.panel) {
    case 'traffic_status':
      Plotly.newPlot(el, [{
        type: 'pie', hole: 0.35, textposition: 'inside', insidetextorientation: 'radial',
        labels: column(t, 'action'), values: column(t, 'flow_count'),
        marker: { colors: column(t, 'action').map(a => a === 'REJECT' ? 'purple' : 'lavender') },
        textfont: { size: 22, color: 'black', family: 'Arial' }, pull: [0.02, 0.02],
      }], { margin: { l: 30, r: 150, t: 50, b: 20 },
            legend: { x: 1.15, y: 0.5, bordercolor: 'black', borderwidth: 1, font: { size: 18 } } },
         { responsive: true });
      break;
    case 'top_talkers':
      Plotly.newPlot(el, [{
        type: 'bar', x: column(t, 'srcaddr'), y: column(t, 'total_bytes'), marker: { color: '#cc0066' },
      }], { font: { size: 20 }, xaxis: { title: 'Source IP' }, yaxis: { title: 'Total Bytes' } },
         { responsive: true });
      break;
    case 'traffic_over_time':
      Plotly.newPlot(el, [{
        type: 'scatter', mode: 'lines+markers', x: column(t, 'time_bucket'), y: column(t, 'flow_count'),
        line: { color: 'red', width: 4 },
      }], { font: { size: 20 } }, { responsive: true });
      break;
    default:
      el.innerHTML = (isAnomaly ? notice('warning', anomalyWarnings[report.panel]) : '') + tableHtml(t);
  }
}

async function load() {
  try {
    const response = await fetch('/api/panels');
    if (!response.ok) throw new Error(`HTTP ${response.status}`);
    const reports = await response.json();
    reports.forEach(render);
    const newest = reports.map(r => r.generated_at).sort().pop();
    document.getElementById('generated').textContent = newest ? `Generated at ${newest}` : '';
  } catch (e) {
    document.getElementById('generated').innerHTML = notice('error', `Failed to load dashboard: ${e.message}`);
  }
}

load();
</script>
</body>
</html>
"##;
