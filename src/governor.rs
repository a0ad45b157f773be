//! Governor middleware (C6): the framework-agnostic entry point that wraps
//! the policy evaluator with header attachment.
//!
//! No HTTP framework dependency is introduced here; `evaluate` is a plain
//! async function a web framework's middleware layer calls with the fields
//! it already extracted from the real request (spec section 4.6 — this
//! crate is explicitly not a general API gateway/router).

use crate::errors::LimitKind;
use crate::policy::{PolicyEvaluator, PolicyRequest, PolicyVerdict};
use crate::settings::Tier;
use std::collections::HashMap;
use std::time::Duration;

/// Everything needed to evaluate and respond to one request.
#[derive(Debug, Clone)]
pub struct GovernorRequest {
    pub policy: PolicyRequest,
}

#[derive(Debug, Clone)]
pub enum GovernorOutcome {
    Allow {
        headers: HashMap<String, String>,
    },
    Deny {
        status: u16,
        headers: HashMap<String, String>,
        body: DenyBody,
    },
    /// The DDoS gate scored the request past the challenge threshold but
    /// not the block threshold; the caller should serve a CAPTCHA/challenge
    /// rather than the raw deny response (spec section 4.6 / 6.1).
    Challenge {
        status: u16,
        headers: HashMap<String, String>,
        body: ChallengeBody,
    },
    /// The store failed; fail closed (spec section 4.6). Counters from
    /// chain steps that already completed are not rolled back.
    Error { message: String },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DenyBody {
    pub error: &'static str,
    pub limit_type: &'static str,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChallengeBody {
    pub error: &'static str,
    pub reason: &'static str,
    pub suspicious_score: u8,
    pub challenge_required: bool,
}

fn retry_after_header(retry_after: Duration) -> String {
    retry_after.as_secs().max(1).to_string()
}

fn rate_limit_headers(
    tier: Tier,
    limit: i64,
    remaining: i64,
    reset_at: i64,
    suspicious_score: u8,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("X-Gaming-Rate-Limit".to_string(), limit.to_string());
    headers.insert("X-Gaming-Rate-Remaining".to_string(), remaining.max(0).to_string());
    headers.insert("X-Gaming-Rate-Reset".to_string(), reset_at.to_string());
    headers.insert("X-Gaming-Rate-Tier".to_string(), tier.as_str().to_string());
    if suspicious_score > 0 {
        headers.insert("X-Suspicious-Score".to_string(), suspicious_score.to_string());
    }
    headers
}

pub struct GovernorMiddleware {
    evaluator: PolicyEvaluator,
}

impl GovernorMiddleware {
    pub fn new(evaluator: PolicyEvaluator) -> Self {
        Self { evaluator }
    }

    pub async fn evaluate(&self, request: &GovernorRequest) -> GovernorOutcome {
        match self.evaluator.evaluate(&request.policy).await {
            Ok(PolicyVerdict::Allow {
                headers,
                suspicious_score,
            }) => {
                let mut out = rate_limit_headers(
                    request.policy.tier,
                    headers.limit,
                    headers.remaining,
                    headers.reset_at,
                    suspicious_score,
                );
                out.insert("X-DDoS-Protection".to_string(), "passed".to_string());
                GovernorOutcome::Allow { headers: out }
            }
            Ok(PolicyVerdict::Challenge { suspicious_score }) => {
                let mut headers = HashMap::new();
                headers.insert("X-Suspicious-Score".to_string(), suspicious_score.to_string());
                GovernorOutcome::Challenge {
                    status: 429,
                    headers,
                    body: ChallengeBody {
                        error: "Challenge required",
                        reason: LimitKind::DdosProtection.as_str(),
                        suspicious_score,
                        challenge_required: true,
                    },
                }
            }
            Ok(PolicyVerdict::Deny {
                kind,
                retry_after,
                remaining,
                reset_at,
                suspicious_score,
            }) => {
                let mut headers =
                    rate_limit_headers(request.policy.tier, 0, remaining, reset_at, suspicious_score);
                headers.insert("Retry-After".to_string(), retry_after_header(retry_after));
                // Every block verdict is a 429 (spec section 7: both
                // `rate_limited` and `ddos_blocked` wire to 429; the
                // distinction is carried in `limit_type`, not the status).
                GovernorOutcome::Deny {
                    status: 429,
                    headers,
                    body: DenyBody {
                        error: if matches!(kind, LimitKind::DdosProtection) {
                            "too many requests"
                        } else {
                            "rate_limited"
                        },
                        limit_type: kind.as_str(),
                        retry_after_seconds: retry_after.as_secs().max(1),
                    },
                }
            }
            Ok(PolicyVerdict::Unauthenticated) => GovernorOutcome::Deny {
                status: 401,
                headers: HashMap::new(),
                body: DenyBody {
                    error: "unauthenticated",
                    limit_type: "unauthenticated",
                    retry_after_seconds: 0,
                },
            },
            Err(e) => GovernorOutcome::Error {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterEngine;
    use crate::ip_reputation::IpReputation;
    use crate::kv_store::memory::InMemoryKvStore;
    use crate::policy::UpstreamTarget;
    use crate::settings::{Settings, Tier};
    use crate::threat_scorer::ThreatScorer;
    use std::sync::Arc;

    fn middleware() -> GovernorMiddleware {
        let settings = Arc::new(Settings::default());
        let store = Arc::new(InMemoryKvStore::new());
        let counters = Arc::new(CounterEngine::new(store.clone()));
        let ip_reputation = Arc::new(IpReputation::new(store.clone(), &[], &[]).unwrap());
        let threat_scorer = Arc::new(ThreatScorer::new(store, settings.ddos.clone()));
        GovernorMiddleware::new(PolicyEvaluator::new(settings, counters, ip_reputation, threat_scorer))
    }

    fn request() -> GovernorRequest {
        GovernorRequest {
            policy: PolicyRequest {
                ip: "198.51.100.4".parse().unwrap(),
                user_id: Some("u1".to_string()),
                tier: Tier::Free,
                authenticated: true,
                endpoint: "/api/summoner".to_string(),
                region: None,
                country: None,
                upstream_target: None,
                user_agent: "GamingApp/2.0".to_string(),
                raw_path: "/api/summoner".to_string(),
                referrer: Some("https://gaming.example/client".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn allow_carries_rate_limit_headers() {
        let mw = middleware();
        match mw.evaluate(&request()).await {
            GovernorOutcome::Allow { headers } => {
                assert!(headers.contains_key("X-Gaming-Rate-Limit"));
                assert!(headers.contains_key("X-DDoS-Protection"));
            }
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ddos_block_returns_429_with_retry_after() {
        let mw = middleware();
        let mut req = request();
        req.policy.user_agent = "masscan/1.0".to_string();
        req.policy.raw_path = "/admin/../etc/passwd".to_string();
        req.policy.referrer = None;
        match mw.evaluate(&req).await {
            GovernorOutcome::Deny { status, headers, .. } => {
                assert_eq!(status, 429);
                assert!(headers.contains_key("Retry-After"));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn challenge_score_returns_429_with_challenge_body() {
        let mw = middleware();
        let mut req = request();
        // Suspicious UA (+25) and missing referrer outside `/api/` (+10)
        // alone only reach a weighted score of 35 (below the 50 challenge
        // floor); 50 rapid requests add burst timing (+30), landing at 65 -
        // past the challenge threshold but short of the 80 block one.
        req.policy.user_agent = "curl-scraper/1.0".to_string();
        req.policy.raw_path = "/dashboard/export".to_string();
        req.policy.referrer = None;

        for _ in 0..49 {
            let _ = mw.evaluate(&req).await;
        }
        match mw.evaluate(&req).await {
            GovernorOutcome::Challenge { status, body, .. } => {
                assert_eq!(status, 429);
                assert_eq!(body.error, "Challenge required");
                assert!(body.challenge_required);
            }
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthenticated_caller_gets_401_on_auth_required_endpoint() {
        use crate::settings::{EndpointConfig, EndpointPolicy};
        use std::collections::HashMap;

        let mut policies = HashMap::new();
        policies.insert(
            "/api/summoner".to_string(),
            EndpointPolicy {
                rpm: 100,
                rph: None,
                min_tier: None,
                expensive: false,
                requires_auth: true,
            },
        );
        let mut settings = Settings::default();
        settings.endpoints = EndpointConfig { policies };
        let settings = Arc::new(settings);
        let store = Arc::new(InMemoryKvStore::new());
        let counters = Arc::new(CounterEngine::new(store.clone()));
        let ip_reputation = Arc::new(IpReputation::new(store.clone(), &[], &[]).unwrap());
        let threat_scorer = Arc::new(ThreatScorer::new(store, settings.ddos.clone()));
        let mw = GovernorMiddleware::new(PolicyEvaluator::new(
            settings,
            counters,
            ip_reputation,
            threat_scorer,
        ));

        let mut req = request();
        req.policy.authenticated = false;
        match mw.evaluate(&req).await {
            GovernorOutcome::Deny { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body.limit_type, "unauthenticated");
            }
            other => panic!("expected 401, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn production_upstream_target_is_allowed() {
        let mw = middleware();
        let mut req = request();
        req.policy.upstream_target = Some(UpstreamTarget::Production);
        let outcome = mw.evaluate(&req).await;
        assert!(matches!(outcome, GovernorOutcome::Allow { .. }));
    }
}
