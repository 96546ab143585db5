use crate::config::SourceConfig;
use std::fmt::Write;

/// Push URL for a source. Slugs are restricted to URL-safe characters.
pub fn push_url(base_url: &str, slug: &str) -> String {
    format!("{}/push/misskey/{slug}", base_url.trim_end_matches('/'))
}

/// Markdown status page listing every source and the URL to give Misskey.
pub fn render_display(enabled: bool, base_url: &str, sources: &[SourceConfig]) -> String {
    let mut out = String::from("# Misskey Webhook Bridge\n\n");
    let _ = write!(out, "Enabled: {enabled}\n\n## Sources:\n");

    for source in sources {
        let url = push_url(base_url, &source.slug);
        let _ = write!(
            out,
            "\n### **{}** ({})\n\n- Secret: {}\n- URL: [{url}]({url}) \
             (Append /abuse to receive abuse reports, /follow for follow events)\n",
            source.name, source.slug, source.secret
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sources_with_urls() {
        let sources = vec![SourceConfig {
            slug: "me:me.com".to_string(),
            name: "Mine".to_string(),
            secret: "abc".to_string(),
            priority: 4,
        }];
        let page = render_display(true, "http://127.0.0.1:8080/", &sources);
        assert!(page.starts_with("# Misskey Webhook Bridge\n\nEnabled: true\n"));
        assert!(page.contains("### **Mine** (me:me.com)"));
        assert!(page.contains("- Secret: abc"));
        assert!(page.contains(
            "[http://127.0.0.1:8080/push/misskey/me:me.com](http://127.0.0.1:8080/push/misskey/me:me.com)"
        ));
    }

    #[test]
    fn empty_source_list() {
        let page = render_display(false, "", &[]);
        assert_eq!(page, "# Misskey Webhook Bridge\n\nEnabled: false\n\n## Sources:\n");
    }
}
