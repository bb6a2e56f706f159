//! Self-contained HTML report (plus optional JSON export) for one run.

use super::scroll_controller::{ReportSink, RunSummary};
use crate::scraping::feed_scraper::normalize::report_slug;
use crate::types::PostRecord;
use chrono::{DateTime, Local};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const MAX_IMAGES_PER_CARD: usize = 8;
const MAX_LINKS_PER_CARD: usize = 8;
const UNKNOWN_AUTHOR: &str = "Unknown author";
/// Capture label shown in the report header, e.g. `2024 November, 20 - 09:05:03`.
const CAPTURE_LABEL_FORMAT: &str = "%Y %B, %d - %H:%M:%S";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize posts: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: Option<PathBuf>,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    page_url: Option<&'a str>,
    captured_at: String,
    summary: Option<&'a RunSummary>,
    posts: &'a [PostRecord],
}

/// Writes reports under `<reports_dir>/<page slug>/<MM.DD.YYYY_HH.MM.SS>.html`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    reports_dir: PathBuf,
    write_json: bool,
}

impl ReportWriter {
    pub fn new(reports_dir: impl Into<PathBuf>, write_json: bool) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            write_json,
        }
    }

    pub fn report_path(&self, page_url: Option<&str>, captured_at: &DateTime<Local>) -> PathBuf {
        let slug = report_slug(page_url.unwrap_or(""));
        self.reports_dir
            .join(slug)
            .join(format!("{}.html", captured_at.format("%m.%d.%Y_%H.%M.%S")))
    }

    pub fn write(
        &self,
        page_url: Option<&str>,
        records: &[PostRecord],
        summary: Option<&RunSummary>,
        captured_at: &DateTime<Local>,
    ) -> Result<ReportPaths, ReportError> {
        let html_path = self.report_path(page_url, captured_at);
        if let Some(dir) = html_path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let label = captured_at.format(CAPTURE_LABEL_FORMAT).to_string();
        let html = render_report(page_url, &label, records);
        write_file(&html_path, html.as_bytes())?;
        info!("report written: {} ({} posts)", html_path.display(), records.len());

        let json = if self.write_json {
            let path = html_path.with_extension("json");
            let export = JsonExport {
                page_url,
                captured_at: captured_at.to_rfc3339(),
                summary,
                posts: records,
            };
            write_file(&path, serde_json::to_string_pretty(&export)?.as_bytes())?;
            info!("json export written: {}", path.display());
            Some(path)
        } else {
            None
        };

        Ok(ReportPaths {
            html: html_path,
            json,
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    std::fs::write(path, bytes).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// [`ReportSink`] that writes the report to disk and keeps the outcome for the caller.
pub struct FileReportSink {
    writer: ReportWriter,
    captured_at: DateTime<Local>,
    pub outcome: Option<Result<ReportPaths, ReportError>>,
}

impl FileReportSink {
    pub fn new(writer: ReportWriter, captured_at: DateTime<Local>) -> Self {
        Self {
            writer,
            captured_at,
            outcome: None,
        }
    }
}

impl ReportSink for FileReportSink {
    fn deliver(&mut self, page_url: Option<&str>, records: &[PostRecord], summary: Option<&RunSummary>) {
        if summary.is_none() {
            warn!("run ended early; writing partial report with {} posts", records.len());
        }
        self.outcome = Some(
            self.writer
                .write(page_url, records, summary, &self.captured_at),
        );
    }
}

fn author_of(record: &PostRecord) -> &str {
    record
        .author
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or(UNKNOWN_AUTHOR)
}

/// Lowercased text a card is matched against by the search box.
fn search_blob(record: &PostRecord, author: &str, ts_raw: &str) -> String {
    let mut parts: Vec<&str> = vec![record.text.as_str(), author, ts_raw];
    parts.extend(record.permalink.as_deref());
    for link in &record.links {
        parts.push(&link.text);
        parts.push(&link.href);
    }
    parts.extend(record.media_urls.iter().map(String::as_str));
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn render_card(index: usize, record: &PostRecord, author_count: usize) -> String {
    let author = author_of(record);
    let ts_raw = record
        .timestamp
        .as_ref()
        .map(|t| t.raw.as_str())
        .unwrap_or("");
    let ts_sort = record
        .timestamp
        .as_ref()
        .and_then(|t| t.parsed)
        .map(|p| p.timestamp().to_string())
        .unwrap_or_default();
    let permalink = record.permalink.as_deref().unwrap_or("");

    let mut card = format!(
        r#"<div class="post-card" data-order="{index}" data-author="{author_attr}" data-count="{author_count}" data-time="{ts_sort}" data-search="{search}">
<div class="post-header"><div><strong>{author_text}</strong> <span class="post-index">#{num}</span></div><div class="post-meta">{ts}</div></div>
"#,
        author_attr = attr(author),
        search = attr(&search_blob(record, author, ts_raw)),
        author_text = text(author),
        num = index + 1,
        ts = text(ts_raw),
    );

    if !permalink.is_empty() {
        card.push_str(&format!(
            r#"<div class="post-meta">Permalink: <a href="{href}" target="_blank" rel="noopener">{label}</a></div>
"#,
            href = attr(permalink),
            label = text(permalink),
        ));
    }
    if !record.text.is_empty() {
        card.push_str(&format!(
            "<div class=\"post-text\">{}</div>\n",
            text(&record.text)
        ));
    }
    if !record.media_urls.is_empty() {
        card.push_str("<div class=\"images\">");
        for src in record.media_urls.iter().take(MAX_IMAGES_PER_CARD) {
            card.push_str(&format!(
                r#"<a href="{src}" target="_blank" rel="noopener"><img class="thumb-img" loading="lazy" src="{src}"></a>"#,
                src = attr(src),
            ));
        }
        card.push_str("</div>\n");
    }
    if !record.links.is_empty() {
        card.push_str("<div class=\"links\"><strong>Links:</strong>");
        for link in record.links.iter().take(MAX_LINKS_PER_CARD) {
            let label = if link.text.is_empty() {
                link.href.as_str()
            } else {
                link.text.as_str()
            };
            card.push_str(&format!(
                r#"<div><a href="{href}" target="_blank" rel="noopener">{label}</a></div>"#,
                href = attr(&link.href),
                label = text(label),
            ));
        }
        card.push_str("</div>\n");
    }
    card.push_str("</div>\n");
    card
}

/// Posts of one author, case-insensitively, in discovery order.
struct AuthorGroup<'a> {
    name: &'a str,
    first_index: usize,
    members: Vec<usize>,
}

/// Groups in order of each author's first post.
fn group_by_author(records: &[PostRecord]) -> Vec<AuthorGroup<'_>> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<AuthorGroup<'_>> = Vec::new();
    for (i, r) in records.iter().enumerate() {
        let name = author_of(r);
        let slot = *slots.entry(name.to_lowercase()).or_insert_with(|| {
            groups.push(AuthorGroup {
                name,
                first_index: i,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(i);
    }
    groups
}

fn render_group(group: &AuthorGroup<'_>, records: &[PostRecord]) -> String {
    let count = group.members.len();
    let cards: String = group
        .members
        .iter()
        .map(|&i| render_card(i, &records[i], count))
        .collect();
    format!(
        r#"<div class="author-group" data-author="{author_attr}" data-count="{count}" data-order="{order}">
<div class="author-header" onclick="toggleGroup(this)"><span class="caret"></span>{author_text} <span class="group-count">({count} {noun})</span></div>
<div class="group-body">
{cards}</div></div>
"#,
        author_attr = attr(group.name),
        order = group.first_index,
        author_text = text(group.name),
        noun = if count == 1 { "post" } else { "posts" },
    )
}

/// Full report document. The flat view lists cards in discovery order; the grouped view
/// nests the same cards under collapsible per-author headers.
pub fn render_report(page_url: Option<&str>, capture_label: &str, records: &[PostRecord]) -> String {
    let groups = group_by_author(records);
    let mut count_of = vec![0; records.len()];
    for g in &groups {
        for &i in &g.members {
            count_of[i] = g.members.len();
        }
    }

    // case-insensitive order, first spelling wins
    let authors: BTreeMap<String, &str> = groups
        .iter()
        .map(|g| (g.name.to_lowercase(), g.name))
        .collect();
    let author_options: String = authors
        .values()
        .map(|a| format!(r#"<option value="{}">{}</option>"#, attr(a), text(a)))
        .collect();
    let cards: String = records
        .iter()
        .enumerate()
        .map(|(i, r)| render_card(i, r, count_of[i]))
        .collect();
    let grouped: String = groups.iter().map(|g| render_group(g, records)).collect();
    let empty = if records.is_empty() {
        r#"<p class="empty">No posts were captured.</p>"#
    } else {
        ""
    };
    let page = page_url.unwrap_or("(unknown page)");

    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>Feed report - {title}</title>
<style>{STYLE}</style>
<script>{SCRIPT}</script>
</head><body>
<h1>Feed report</h1>
<div class="page-url"><a href="{page_href}" target="_blank" rel="noopener">{page_text}</a> - {label} - Total posts: <span id="total_posts">{total}</span> - Authors: {author_total}</div>
<div class="controls">
<input id="flt_text" type="text" placeholder="Search text, links, media..." oninput="applyFilters()">
<select id="flt_author" onchange="applyFilters()"><option value="ALL">All authors</option>{author_options}</select>
<select id="view_mode" onchange="setView()">
<option value="flat">All posts</option>
<option value="group">Group by author</option>
</select>
<select id="sort_mode" onchange="applySorting()">
<option value="order">Discovery order</option>
<option value="az">Author (A-Z)</option>
<option value="za">Author (Z-A)</option>
<option value="newest">Newest first</option>
<option value="count_desc">Most posts per author</option>
<option value="count_asc">Fewest posts per author</option>
</select>
<span id="visible_posts" class="total-posts"></span>
</div>
<div id="cards">
{empty}{cards}</div>
<div id="groups" hidden>
{grouped}</div>
</body></html>
"#,
        title = text(page),
        page_href = attr(page_url.unwrap_or("#")),
        page_text = text(page),
        label = text(capture_label),
        total = records.len(),
        author_total = groups.len(),
    )
}

const STYLE: &str = r#"
body{background:#0d1117;color:#e6edf3;font-family:Segoe UI,Roboto,Arial,sans-serif;padding:25px;}
h1{color:#58a6ff;margin-bottom:4px;}
a{color:#58a6ff;}
.page-url{font-size:15px;opacity:.9;margin-bottom:20px;}
.controls{display:flex;gap:15px;flex-wrap:wrap;margin:20px 0 25px;}
input[type="text"],select{padding:6px 10px;background:#161b22;border:1px solid #30363d;color:#e6edf3;border-radius:6px;}
.post-card{margin:12px 0;background:#0f141a;border:1px solid #30363d;border-radius:8px;padding:12px;}
.post-header{display:flex;justify-content:space-between;font-size:14px;}
.post-index{color:#8b949e;font-size:12px;}
.post-meta{font-size:12px;color:#8b949e;margin-top:4px;}
.post-text{margin-top:8px;white-space:pre-wrap;}
.thumb-img{max-width:180px;border-radius:6px;border:1px solid #30363d;margin:4px;}
.links,.images{margin-top:10px;font-size:12px;}
.total-posts{font-size:14px;color:#58a6ff;align-self:center;}
.empty{color:#8b949e;text-align:center;padding:40px;}
.author-group{margin:14px 0;border:1px solid #30363d;border-radius:8px;background:#161b22;}
.author-header{cursor:pointer;padding:10px 14px;font-weight:600;color:#58a6ff;}
.author-header .caret::before{content:"\25BE";display:inline-block;margin-right:8px;}
.author-group.collapsed .caret::before{content:"\25B8";}
.author-group.collapsed .group-body{display:none;}
.group-body{padding:0 12px 8px;}
.group-count{color:#8b949e;font-weight:400;font-size:12px;}
"#;

const SCRIPT: &str = r#"
function grouped(){ return document.getElementById("view_mode").value === "group"; }
function setView(){
  document.getElementById("cards").hidden = grouped();
  document.getElementById("groups").hidden = !grouped();
  applyFilters();
  applySorting();
}
function toggleGroup(header){ header.parentElement.classList.toggle("collapsed"); }
function applyFilters(){
  const q = document.getElementById("flt_text").value.toLowerCase();
  const author = document.getElementById("flt_author").value.toLowerCase();
  const match = card => (!q || card.dataset.search.includes(q)) &&
    (author === "all" || card.dataset.author.toLowerCase() === author);
  let shown = 0;
  const box = document.getElementById(grouped() ? "groups" : "cards");
  box.querySelectorAll(".post-card").forEach(card => {
    const ok = match(card);
    card.style.display = ok ? "" : "none";
    if (ok) shown++;
  });
  box.querySelectorAll(".author-group").forEach(group => {
    const any = Array.from(group.querySelectorAll(".post-card")).some(match);
    group.style.display = any ? "" : "none";
  });
  document.getElementById("visible_posts").textContent = shown + " shown";
}
function compare(mode, a, b){
  const order = x => parseInt(x.dataset.order, 10);
  const name = x => x.dataset.author.toLowerCase();
  const count = x => parseInt(x.dataset.count, 10);
  const time = x => x.dataset.time ? parseInt(x.dataset.time, 10) : -Infinity;
  switch (mode) {
    case "az": return name(a).localeCompare(name(b)) || order(a) - order(b);
    case "za": return name(b).localeCompare(name(a)) || order(a) - order(b);
    case "newest": return (time(b) - time(a)) || order(a) - order(b);
    case "count_desc": return (count(b) - count(a)) || order(a) - order(b);
    case "count_asc": return (count(a) - count(b)) || order(a) - order(b);
    default: return order(a) - order(b);
  }
}
function applySorting(){
  const mode = document.getElementById("sort_mode").value;
  const box = document.getElementById(grouped() ? "groups" : "cards");
  const items = Array.from(box.querySelectorAll(grouped() ? ".author-group" : ".post-card"));
  // groups carry no time of their own
  const m = grouped() && mode === "newest" ? "order" : mode;
  items.sort((a, b) => compare(m, a, b));
  items.forEach(x => box.appendChild(x));
}
document.addEventListener("DOMContentLoaded", applyFilters);
"#;
