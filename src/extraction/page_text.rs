use scraper::{ElementRef, Html, Selector};

/// Result containers of the supported engines. The first element in
/// document order matching any of them is used as the text root.
const RESULT_CONTAINERS: &[&str] = &[
    "#search",
    "#b_content",
    "#b_results",
    "main",
    "#search-result",
    "#search-result-aside",
    ".serp-list",
    "#links",
    "#web_content_wrapper",
];

/// Subtrees whose text never reaches the extractor.
const EXCLUDED: &[&str] = &["nav", "header", "footer", "form", "input", "button", "script", "style", "noscript"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "br", "dd", "div", "dl", "dt", "h1", "h2", "h3", "h4", "h5", "h6",
    "hr", "li", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Visible text of the search results region of `html`, one block per line.
pub fn result_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = find_root(&document);

    let mut raw = String::new();
    collect_text(root, &mut raw);

    raw.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn find_root(document: &Html) -> ElementRef<'_> {
    let containers = Selector::parse(&RESULT_CONTAINERS.join(", ")).ok();
    let body = Selector::parse("body").ok();

    containers
        .and_then(|sel| document.select(&sel).next())
        .or_else(|| body.and_then(|sel| document.select(&sel).next()))
        .unwrap_or_else(|| document.root_element())
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if EXCLUDED.contains(&name) {
                continue;
            }
            let block = BLOCKS.contains(&name);
            if block {
                out.push('\n');
            }
            collect_text(child_element, out);
            if block {
                out.push('\n');
            }
        }
    }
}

// Only ASCII whitespace collapses; no-break spaces are digit separators.
fn collapse_whitespace(line: &str) -> String {
    line.split([' ', '\t', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
