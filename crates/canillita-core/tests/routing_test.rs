//! Routing of submissions to source kinds and job kinds.

use canillita_core::{
    ContentClassifier, ErrorKind, JobKind, ProcessedPostRecord, SourceKind, Submission,
};

fn submission(id: &str, url: &str) -> Submission {
    Submission {
        external_id: id.to_string(),
        url: url.to_string(),
        community: Some("argentina".to_string()),
        title: None,
    }
}

#[test]
fn test_mixed_submissions_route_to_matching_jobs() {
    let classifier = ContentClassifier::new(vec!["lanacion.com.ar".into()], vec![]);
    let cases = [
        ("a", "https://www.lanacion.com.ar/politica/nota-nid01012024/", JobKind::ExtractArticle),
        ("b", "https://youtu.be/abcdEFGH123", JobKind::SummarizeVideo),
        ("c", "https://x.com/user/status/42", JobKind::FormatSocialPost),
    ];
    for (id, url, expected) in cases {
        let source = classifier.source_for(&submission(id, url)).unwrap();
        assert_eq!(JobKind::for_source(source.kind), expected, "{}", url);
    }
}

#[test]
fn test_unsupported_submission_becomes_failure_record() {
    let classifier = ContentClassifier::new(vec!["lanacion.com.ar".into()], vec![]);
    let sub = submission("d", "https://random-blog.net/post");
    let err = classifier.source_for(&sub).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permanent);

    let source = canillita_core::SourceRef::new(&sub.external_id, &sub.url, SourceKind::Article);
    let record = ProcessedPostRecord::failed(source, err.to_string(), chrono::Utc::now());
    assert!(!record.success);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("Unsupported content type"));
}

#[test]
fn test_provider_rules_parse_from_yaml_list() {
    let yaml = r#"
- name: Infobae
  domain_pattern: infobae.com
  content_selectors: [".article-body", "article"]
  remove_selectors: [".related-news"]
  min_text_length: 300
  min_text_to_markup_ratio: 0.05
- domain_pattern: clarin.com
  content_selectors: [".body-nota"]
"#;
    let rules: Vec<canillita_core::ProviderRule> = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].display_name(), "Infobae");
    assert_eq!(rules[0].min_text_length, 300);
    assert_eq!(rules[1].display_name(), "clarin.com");
    for rule in &rules {
        rule.validate(false).unwrap();
    }
}
