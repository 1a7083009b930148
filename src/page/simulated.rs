//! In-memory feed used by tests: reveals posts a page at a time as it is
//! scrolled toward the end of the loaded content.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::{GleanerError, Result};
use crate::page::{Affordance, FeedMetrics, FeedPage};

const HEADER_HEIGHT: f64 = 200.0;

pub(crate) struct SimPost {
    html: String,
    expanded: Option<String>,
}

struct SimState {
    posts: Vec<SimPost>,
    revealed: usize,
    page_size: usize,
    post_height: f64,
    viewport: f64,
    scroll_top: f64,
    sentinel: Option<f64>,
    detach_calls: usize,
    clicks: usize,
    scope: Vec<String>,
}

pub(crate) struct SimulatedFeed {
    url: String,
    title: String,
    state: Mutex<SimState>,
}

impl SimulatedFeed {
    pub fn new(page_size: usize) -> Self {
        Self {
            url: "https://www.facebook.com/groups/424242".to_string(),
            title: "Bike Swap".to_string(),
            state: Mutex::new(SimState {
                posts: Vec::new(),
                revealed: 0,
                page_size,
                post_height: 400.0,
                viewport: 800.0,
                scroll_top: 0.0,
                sentinel: None,
                detach_calls: 0,
                clicks: 0,
                scope: Vec::new(),
            }),
        }
    }

    /// Canonical post markup with a permalink carrying `id`.
    pub fn post_html(id: &str, author: &str, text: &str) -> String {
        format!(
            r#"<div aria-posinset="{id}">
                 <h3><a href="https://www.facebook.com/groups/424242/user/9{id}/">{author}</a></h3>
                 <a href="https://www.facebook.com/groups/424242/posts/{id}/"><abbr data-utime="1700000000">2h</abbr></a>
                 <div data-ad-preview="message"><div dir="auto">{text}</div></div>
                 <div aria-label="Like: {id} people"></div>
               </div>"#
        )
    }

    pub fn with_post(self, id: &str, author: &str, text: &str) -> Self {
        self.with_raw(Self::post_html(id, author, text))
    }

    pub fn with_posts(mut self, count: usize) -> Self {
        for i in 1..=count {
            self = self.with_post(
                &format!("{}", 1000 + i),
                &format!("Member {}", i),
                &format!("Post number {} has something to say about bikes", i),
            );
        }
        self
    }

    pub fn with_raw(self, html: String) -> Self {
        self.push(SimPost {
            html,
            expanded: None,
        })
    }

    /// Post whose markup switches to `expanded` once its "See more" is clicked.
    pub fn with_expandable(self, collapsed: String, expanded: String) -> Self {
        self.push(SimPost {
            html: collapsed,
            expanded: Some(expanded),
        })
    }

    fn push(self, post: SimPost) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.posts.push(post);
            state.revealed = state.page_size.min(state.posts.len());
        }
        self
    }

    pub fn revealed(&self) -> usize {
        self.state.lock().unwrap().revealed
    }

    pub fn sentinel(&self) -> Option<f64> {
        self.state.lock().unwrap().sentinel
    }

    pub fn detach_calls(&self) -> usize {
        self.state.lock().unwrap().detach_calls
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    pub fn scope(&self) -> Vec<String> {
        self.state.lock().unwrap().scope.clone()
    }
}

impl SimState {
    fn scroll_height(&self) -> f64 {
        HEADER_HEIGHT + self.revealed as f64 * self.post_height
    }

    fn metrics(&self) -> FeedMetrics {
        FeedMetrics {
            scroll_top: self.scroll_top,
            scroll_height: self.scroll_height(),
            viewport_height: self.viewport,
        }
    }
}

#[async_trait]
impl FeedPage for SimulatedFeed {
    async fn current_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn focus(&self, containers: &[String]) -> Result<()> {
        self.state.lock().unwrap().scope = containers.to_vec();
        Ok(())
    }

    async fn metrics(&self) -> Result<FeedMetrics> {
        Ok(self.state.lock().unwrap().metrics())
    }

    async fn scroll_by(&self, px: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let max_top = (state.scroll_height() - state.viewport).max(0.0);
        state.scroll_top = (state.scroll_top + px).min(max_top);

        if state.metrics().distance_to_edge() <= state.post_height {
            state.revealed = (state.revealed + state.page_size).min(state.posts.len());
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        let posts: String = state.posts[..state.revealed]
            .iter()
            .map(|p| p.html.as_str())
            .collect();
        Ok(format!(
            r#"<html><head><title>{title} | Facebook</title></head>
               <body><h1>{title}</h1><span>12.5K members</span>
               <div role="feed">{posts}</div></body></html>"#,
            title = self.title
        ))
    }

    async fn click_matching(&self, affordance: &Affordance) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let revealed = state.revealed;
        let mut clicked = 0;
        for post in state.posts[..revealed].iter_mut() {
            let label_present = affordance.labels.iter().any(|l| post.html.contains(l.as_str()));
            if label_present {
                if let Some(expanded) = post.expanded.take() {
                    post.html = expanded;
                    clicked += 1;
                }
            }
        }
        state.clicks += clicked;
        Ok(clicked)
    }

    async fn place_sentinel(&self, offset: f64) -> Result<()> {
        if offset.is_nan() {
            return Err(GleanerError::Page("invalid sentinel offset".into()));
        }
        self.state.lock().unwrap().sentinel = Some(offset);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.sentinel = None;
        state.detach_calls += 1;
        Ok(())
    }
}
