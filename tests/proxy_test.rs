use scrape_dispatch::proxy::scorer::MIN_SCORE;
use scrape_dispatch::proxy::{ProxyManager, ProxyScorer};
use std::collections::HashSet;

/// Builds 25 proxies with strictly decreasing scores: proxy `i` answers in
/// `0.2 * i` seconds.
fn graded_pool() -> (Vec<String>, ProxyScorer) {
    let mut scorer = ProxyScorer::in_memory();
    let proxies: Vec<String> = (0..25).map(|i| format!("10.0.0.{}:8080", i)).collect();
    for (i, proxy) in proxies.iter().enumerate() {
        scorer.record(proxy, true, 0.2 * i as f64, false);
    }
    (proxies, scorer)
}

#[test]
fn rotation_draws_only_from_the_top_twenty() {
    let (proxies, scorer) = graded_pool();
    let top: HashSet<String> = scorer
        .rank(&proxies)
        .into_iter()
        .take(20)
        .map(|(p, _)| p.to_string())
        .collect();
    let manager = ProxyManager::new(proxies, scorer);

    let mut seen = HashSet::new();
    for call in 0..1000 {
        let domain = format!("site{}.example", call % 7);
        let proxy = manager.get_proxy(&domain, true).unwrap();
        assert!(top.contains(&proxy), "{} is outside the top 20", proxy);
        seen.insert(proxy);
    }
    assert!(seen.len() >= 2);
}

#[test]
fn sticky_assignment_follows_the_best_proxy() {
    let (proxies, scorer) = graded_pool();
    let manager = ProxyManager::new(proxies, scorer);

    let first = manager.get_proxy("a.example", false).unwrap();
    assert_eq!(first, "10.0.0.0:8080");
    for _ in 0..10 {
        assert_eq!(manager.get_proxy("a.example", false).unwrap(), first);
    }

    manager.report_failure(&first);
    manager.report_failure(&first);
    manager.rotate("a.example");
    let next = manager.get_proxy("a.example", false).unwrap();
    assert_ne!(next, first);
    assert_eq!(next, "10.0.0.1:8080");
}

#[test]
fn repeated_failures_never_drop_below_the_floor() {
    let manager = ProxyManager::new(vec!["bad:1".to_string()], ProxyScorer::in_memory());
    for _ in 0..50 {
        manager.report_failure("bad:1");
    }
    assert_eq!(manager.score("bad:1"), MIN_SCORE);
    assert_eq!(manager.get_proxy("x.example", true).unwrap(), "bad:1");
}

#[test]
fn score_table_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.json");

    {
        let manager = ProxyManager::new(vec!["p:1".to_string()], ProxyScorer::load(&path));
        manager.report_success("p:1", 2.0);
        manager.report_failure("p:1");
    }

    let reloaded = ProxyScorer::load(&path);
    let record = reloaded.get("p:1").unwrap();
    assert_eq!(record.success, 1);
    assert_eq!(record.fail, 1);
    assert_eq!(record.blocked, 1);
    assert_eq!(record.latencies, vec![2.0]);
    // 100 - 2*10 - 1*20 - 1*5
    assert_eq!(reloaded.score("p:1"), 55.0);
}
