use crate::page::{Affordance, CLICKED_ATTR, HEIGHT_ATTR, SENTINEL_ID};

/// Quote a list of strings as a JS array literal.
fn js_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Declares `root` (the focused container or null) and `scroller` (the
/// element whose scroll position moves the feed).
fn feed_prelude(scope: &[String]) -> String {
    let scope = js_array(scope);
    format!(
        r#"
            const root = {scope}
                .map(sel => {{ try {{ return document.querySelector(sel); }} catch (e) {{ return null; }} }})
                .find(Boolean) || null;
            const scrolls = el => el.scrollHeight > el.clientHeight + 1
                && /(auto|scroll)/.test(getComputedStyle(el).overflowY);
            const scroller = root && scrolls(root)
                ? root
                : (document.scrollingElement || document.documentElement);
        "#
    )
}

pub fn metrics_script(scope: &[String]) -> String {
    let prelude = feed_prelude(scope);
    format!(
        r#"
        (() => {{
            {prelude}
            return {{
                scrollTop: scroller.scrollTop,
                scrollHeight: scroller.scrollHeight,
                viewportHeight: scroller === root ? root.clientHeight : window.innerHeight
            }};
        }})()
        "#
    )
}

pub fn scroll_script(scope: &[String], px: f64) -> String {
    let prelude = feed_prelude(scope);
    format!(
        r#"
        (() => {{
            {prelude}
            if (scroller === root) {{
                root.scrollBy(0, {px});
            }} else {{
                window.scrollBy(0, {px});
            }}
            return true;
        }})()
        "#
    )
}

/// Stamp rendered heights on block elements, then serialize the document.
pub fn snapshot_script() -> String {
    format!(
        r#"
        (() => {{
            const blocks = document.querySelectorAll('div, article, section, li');
            for (const el of blocks) {{
                el.setAttribute('{HEIGHT_ATTR}', String(el.offsetHeight));
            }}
            return document.documentElement.outerHTML;
        }})()
        "#
    )
}

/// Click matching controls inside the focused container. Anchors that would
/// navigate away from the feed are never clicked.
pub fn click_script(scope: &[String], affordance: &Affordance) -> String {
    let prelude = feed_prelude(scope);
    let selectors = js_array(&affordance.selectors);
    let labels = js_array(
        &affordance
            .labels
            .iter()
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>(),
    );

    format!(
        r#"
        (() => {{
            {prelude}
            const base = root || document;
            const selectors = {selectors};
            const labels = {labels};
            const navigates = el => {{
                if (el.tagName !== 'A') return false;
                const href = (el.getAttribute('href') || '').trim();
                return href !== '' && href !== '#' && !href.startsWith('javascript:');
            }};
            let clicked = 0;
            for (const selector of selectors) {{
                for (const el of base.querySelectorAll(selector)) {{
                    if (el.hasAttribute('{CLICKED_ATTR}')) continue;
                    if (navigates(el)) continue;
                    const text = (el.innerText || '').trim().toLowerCase();
                    if (!text || text.length > 60) continue;
                    if (!labels.some(label => text.startsWith(label))) continue;
                    if (el.offsetParent === null) continue;
                    el.setAttribute('{CLICKED_ATTR}', '1');
                    el.click();
                    clicked += 1;
                }}
            }}
            return clicked;
        }})()
        "#
    )
}

pub fn sentinel_script(offset: f64) -> String {
    format!(
        r#"
        (() => {{
            let marker = document.getElementById('{SENTINEL_ID}');
            if (!marker) {{
                marker = document.createElement('div');
                marker.id = '{SENTINEL_ID}';
                marker.style.cssText =
                    'position:absolute;left:0;width:1px;height:1px;pointer-events:none;';
                document.body.appendChild(marker);
            }}
            marker.style.top = '{offset}px';
            return true;
        }})()
        "#
    )
}

/// Remove the sentinel and every attribute stamped during the run.
pub fn detach_script() -> String {
    format!(
        r#"
        (() => {{
            const marker = document.getElementById('{SENTINEL_ID}');
            if (marker) marker.remove();
            for (const attr of ['{HEIGHT_ATTR}', '{CLICKED_ATTR}']) {{
                for (const el of document.querySelectorAll('[' + attr + ']')) {{
                    el.removeAttribute(attr);
                }}
            }}
            return true;
        }})()
        "#
    )
}
