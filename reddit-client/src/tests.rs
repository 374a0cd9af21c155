#[cfg(test)]
mod tests {
    use crate::api::{MorePlaceholder, RedditPostData};
    use crate::tree::{things_from_values, RawThing};
    use crate::{
        flatten_comments, flatten_with_report, harvest, BatchOutcome, CommentSource, CommentTree,
        PostSource, RedditClient, RedditToken,
    };
    use sentiment_core::{
        CoreError, FlattenConfig, Post, RedditApiError, RedditCredentials, SearchParameters,
        SortMode, TimeFilter,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};

    // Listing builders

    fn comment(id: &str, parent: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "name": format!("t1_{}", id),
                "parent_id": parent,
                "author": "investor",
                "body": format!("comment {}", id),
                "score": 1,
                "created_utc": 1700000000.0,
                "permalink": format!("/r/stocks/comments/p/x/{}/", id),
                "replies": replies
            }
        })
    }

    fn more(parent: &str, children: &[&str]) -> Value {
        json!({
            "kind": "more",
            "data": {
                "id": children.first().copied().unwrap_or("_"),
                "name": format!("t1_{}", children.first().copied().unwrap_or("_")),
                "parent_id": parent,
                "count": children.len(),
                "depth": 0,
                "children": children
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children}})
    }

    fn ids(comments: &[sentiment_core::Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    fn test_config() -> FlattenConfig {
        FlattenConfig {
            max_depth: 5,
            batch_size: 10,
            inter_batch_delay_secs: 0,
            max_retries: 3,
            expansion_limit: None,
        }
    }

    /// Serves canned expansions keyed by placeholder, optionally failing first.
    struct ScriptedSource {
        expansions: HashMap<String, Vec<Value>>,
        failures_before_success: u32,
        calls: AtomicU32,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(expansions: Vec<(&str, Vec<Value>)>) -> Self {
            Self {
                expansions: expansions
                    .into_iter()
                    .map(|(key, things)| (key.to_string(), things))
                    .collect(),
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, times: u32) -> Self {
            self.failures_before_success = times;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CommentSource for ScriptedSource {
        async fn resolve_placeholders(
            &self,
            _link_fullname: &str,
            batch: &[MorePlaceholder],
        ) -> Result<Vec<Vec<RawThing>>, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(batch.len());
            if call < self.failures_before_success {
                return Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: 503,
                }));
            }
            Ok(batch
                .iter()
                .map(|p| {
                    things_from_values(self.expansions.get(&p.key()).cloned().unwrap_or_default())
                })
                .collect())
        }
    }

    fn tree_with_two_placeholders() -> CommentTree {
        CommentTree::from_listing(
            "p",
            listing(vec![
                comment("a", "t3_p", listing(vec![comment("a1", "t1_a", json!(""))])),
                more("t3_p", &["x", "y"]),
                comment("b", "t3_p", listing(vec![more("t1_b", &["b1"])])),
            ]),
        )
    }

    fn expansions_for_two_placeholders() -> Vec<(&'static str, Vec<Value>)> {
        vec![
            (
                "t3_p:x,y",
                vec![
                    comment("x", "t3_p", json!("")),
                    comment("x1", "t1_x", json!("")),
                    comment("y", "t3_p", json!("")),
                ],
            ),
            ("t1_b:b1", vec![comment("b1", "t1_b", json!(""))]),
        ]
    }

    // Tree Flattener

    #[tokio::test]
    async fn test_resolvable_tree_flattens_without_placeholders() {
        let source = ScriptedSource::new(expansions_for_two_placeholders());
        let mut tree = tree_with_two_placeholders();

        let report = flatten_with_report(&source, &mut tree, &test_config(), 0).await;

        assert_eq!(ids(&report.comments), vec!["a", "a1", "x", "x1", "y", "b", "b1"]);
        assert_eq!(report.last_outcome, Some(BatchOutcome::Resolved));
        assert_eq!(report.placeholders_resolved, 2);
        assert_eq!(source.calls(), 1);
        assert!(tree.pending_placeholders().is_empty());

        let depths: Vec<_> = report.comments.iter().map(|c| c.depth).collect();
        assert_eq!(depths, vec![0, 1, 0, 1, 0, 0, 1]);
        assert_eq!(report.comments[0].reply_count, 1);
        assert_eq!(
            report.comments[0].permalink,
            "https://reddit.com/r/stocks/comments/p/x/a/"
        );
    }

    #[tokio::test]
    async fn test_depth_limit_returns_empty_without_calls() {
        let source = ScriptedSource::new(expansions_for_two_placeholders());

        let mut tree = tree_with_two_placeholders();
        let comments = flatten_comments(&source, &mut tree, &test_config(), 5).await;
        assert!(comments.is_empty());

        let mut tree = tree_with_two_placeholders();
        let config = FlattenConfig {
            max_depth: 0,
            ..test_config()
        };
        let comments = flatten_comments(&source, &mut tree, &config, 0).await;
        assert!(comments.is_empty());

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_resolved_comments() {
        let source = ScriptedSource::new(expansions_for_two_placeholders()).failing(u32::MAX);
        let mut tree = tree_with_two_placeholders();

        let report = flatten_with_report(&source, &mut tree, &test_config(), 0).await;

        // First attempt plus three retries
        assert_eq!(source.calls(), 4);
        assert!(report.aborted());
        assert!(matches!(
            report.last_outcome,
            Some(BatchOutcome::Exhausted { attempts: 4, .. })
        ));
        assert_eq!(ids(&report.comments), vec!["a", "a1", "b"]);
        assert_eq!(report.skipped_nodes, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let source = ScriptedSource::new(expansions_for_two_placeholders()).failing(2);
        let mut tree = tree_with_two_placeholders();

        let comments = flatten_comments(&source, &mut tree, &test_config(), 0).await;

        assert_eq!(source.calls(), 3);
        assert_eq!(comments.len(), 7);
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let source = ScriptedSource::new(expansions_for_two_placeholders());
        let mut tree = tree_with_two_placeholders();
        let config = FlattenConfig {
            batch_size: 1,
            ..test_config()
        };

        let report = flatten_with_report(&source, &mut tree, &config, 0).await;

        assert_eq!(report.batches, 2);
        assert_eq!(*source.batch_sizes.lock().unwrap(), vec![1, 1]);
        assert_eq!(report.last_outcome, Some(BatchOutcome::Resolved));
        assert_eq!(report.comments.len(), 7);
    }

    #[tokio::test]
    async fn test_expansion_limit_discards_remaining_placeholders() {
        let source = ScriptedSource::new(expansions_for_two_placeholders());
        let mut tree = tree_with_two_placeholders();
        let config = FlattenConfig {
            batch_size: 1,
            expansion_limit: Some(1),
            ..test_config()
        };

        let report = flatten_with_report(&source, &mut tree, &config, 0).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(
            report.last_outcome,
            Some(BatchOutcome::PartiallyResolved { remaining: 1 })
        );
        assert_eq!(report.placeholders_discarded, 1);
        assert_eq!(ids(&report.comments), vec!["a", "a1", "x", "x1", "y", "b"]);
    }

    #[tokio::test]
    async fn test_nested_placeholders_resolve_in_later_batches() {
        let source = ScriptedSource::new(vec![
            (
                "t3_p:x",
                vec![
                    comment("x", "t3_p", json!("")),
                    more("t1_x", &["x2"]),
                ],
            ),
            ("t1_x:x2", vec![comment("x2", "t1_x", json!(""))]),
        ]);
        let mut tree = CommentTree::from_listing(
            "p",
            listing(vec![comment("a", "t3_p", json!("")), more("t3_p", &["x"])]),
        );

        let report = flatten_with_report(&source, &mut tree, &test_config(), 0).await;

        assert_eq!(report.batches, 2);
        assert_eq!(ids(&report.comments), vec!["a", "x", "x2"]);
        assert_eq!(report.comments[2].depth, 1);
    }

    #[tokio::test]
    async fn test_placeholder_returned_unchanged_is_dropped() {
        let source = ScriptedSource::new(vec![("t3_p:x", vec![more("t3_p", &["x"])])]);
        let mut tree = CommentTree::from_listing(
            "p",
            listing(vec![comment("a", "t3_p", json!("")), more("t3_p", &["x"])]),
        );

        let report = flatten_with_report(&source, &mut tree, &test_config(), 0).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(report.placeholders_discarded, 1);
        assert_eq!(ids(&report.comments), vec!["a"]);
    }

    #[tokio::test]
    async fn test_malformed_nodes_are_skipped() {
        let source = ScriptedSource::new(Vec::new());
        let mut tree = CommentTree::from_listing(
            "p",
            listing(vec![
                comment("a", "t3_p", json!("")),
                // no body
                json!({"kind": "t1", "data": {"id": "nobody", "name": "t1_nobody", "parent_id": "t3_p", "created_utc": 1.0}}),
                // wrong field type
                json!({"kind": "t1", "data": {"id": "bad", "name": "t1_bad", "parent_id": "t3_p", "score": {"up": 1}}}),
                comment("b", "t3_p", json!("")),
            ]),
        );

        let report = flatten_with_report(&source, &mut tree, &test_config(), 0).await;

        assert_eq!(ids(&report.comments), vec!["a", "b"]);
        assert_eq!(report.skipped_nodes, 2);
        assert_eq!(source.calls(), 0);
    }

    // Harvester

    fn post(id: &str, title: &str) -> Post {
        let data: RedditPostData = serde_json::from_value(json!({
            "id": id,
            "title": title,
            "author": "poster",
            "subreddit": "stocks",
            "permalink": format!("/r/stocks/comments/{}/t/", id),
            "created_utc": 1700000000.0,
            "score": 10,
            "num_comments": 2
        }))
        .unwrap();
        data.into()
    }

    struct StubReddit {
        posts: Option<Vec<Post>>,
        trees: HashMap<String, Value>,
    }

    impl CommentSource for StubReddit {
        async fn resolve_placeholders(
            &self,
            _link_fullname: &str,
            batch: &[MorePlaceholder],
        ) -> Result<Vec<Vec<RawThing>>, CoreError> {
            Ok(vec![Vec::new(); batch.len()])
        }
    }

    impl PostSource for StubReddit {
        async fn search_posts(&self, _params: &SearchParameters) -> Result<Vec<Post>, CoreError> {
            self.posts
                .clone()
                .ok_or(CoreError::RedditApi(RedditApiError::ServerError { status_code: 500 }))
        }

        async fn fetch_comment_tree(&self, post_id: &str) -> Result<CommentTree, CoreError> {
            self.trees
                .get(post_id)
                .map(|listing| CommentTree::from_listing(post_id, listing.clone()))
                .ok_or_else(|| {
                    CoreError::RedditApi(RedditApiError::PostNotFound {
                        post_id: post_id.to_string(),
                    })
                })
        }
    }

    fn google_params() -> SearchParameters {
        SearchParameters {
            search_term: "Google".to_string(),
            limit: 5,
            time_filter: TimeFilter::Week,
            sort: SortMode::Relevance,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_harvest_skips_posts_whose_comments_fail() {
        let stub = StubReddit {
            posts: Some(vec![post("p1", "GOOGL earnings"), post("p2", "Gone")]),
            trees: HashMap::from([(
                "p1".to_string(),
                listing(vec![
                    comment("c1", "t3_p1", listing(vec![comment("c2", "t1_c1", json!(""))])),
                    comment("c3", "t3_p1", json!("")),
                ]),
            )]),
        };

        let results = harvest(&stub, &google_params(), &test_config(), "0.1.0").await;

        assert_eq!(results.posts.len(), 1);
        assert_eq!(results.posts[0].comments_count, 3);
        assert_eq!(results.results_summary.posts_retrieved, 1);
        assert_eq!(results.results_summary.total_comments, 3);
        assert!(results.results_summary.success);
        assert_eq!(results.search_parameters.search_term, "Google");
        assert_eq!(results.metadata.tool_version, "0.1.0");
    }

    #[tokio::test]
    async fn test_harvest_failed_search_is_empty() {
        let stub = StubReddit {
            posts: None,
            trees: HashMap::new(),
        };

        let results = harvest(&stub, &google_params(), &test_config(), "0.1.0").await;

        assert!(results.posts.is_empty());
        assert!(!results.results_summary.success);
    }

    // Client against a mock server

    fn credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            user_agent: "desktop:stocksentiment:test".to_string(),
            username: None,
            password: None,
        }
    }

    fn mock_client(server: &mockito::ServerGuard) -> RedditClient {
        RedditClient::with_endpoints(
            credentials(),
            &server.url(),
            &format!("{}/api/v1/access_token", server.url()),
        )
        .unwrap()
    }

    async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/api/v1/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"test-token","token_type":"bearer","expires_in":3600,"scope":"read"}"#,
            )
            .create_async()
            .await
    }

    #[test]
    fn test_grant_selection() {
        let client = RedditClient::new(credentials()).unwrap();
        assert!(!client.uses_password_grant());
        assert_eq!(client.get_required_scopes(), vec!["read"]);
        assert_eq!(client.comment_sort(), "best");

        let mut creds = credentials();
        creds.username = Some("trader".to_string());
        creds.password = Some("hunter2".to_string());
        let client = RedditClient::new(creds).unwrap().with_comment_sort("top");
        assert!(client.uses_password_grant());
        assert_eq!(client.get_required_scopes(), vec!["identity", "read"]);
        assert_eq!(client.comment_sort(), "top");
    }

    #[test]
    fn test_token_expiry() {
        let client = RedditClient::new(credentials()).unwrap();
        assert!(!tokio_test::block_on(client.is_authenticated()));

        let valid = RedditToken {
            access_token: "valid".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(3600),
            scope: vec!["read".to_string()],
        };
        let nearly_expired = RedditToken {
            expires_at: SystemTime::now() + Duration::from_secs(10),
            ..valid.clone()
        };

        assert!(!valid.is_expired());
        assert!(nearly_expired.is_expired());

        tokio_test::block_on(client.set_token(valid));
        assert!(tokio_test::block_on(client.is_authenticated()));
        tokio_test::block_on(client.invalidate_token());
        assert!(!tokio_test::block_on(client.is_authenticated()));
    }

    #[tokio::test]
    async fn test_authentication_with_client_credentials() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = mock_token(&mut server).await;
        let client = mock_client(&server);

        let token = client.ensure_authenticated().await.unwrap();
        assert_eq!(token, "test-token");
        assert!(client.is_authenticated().await);

        // Cached for the second call
        client.ensure_authenticated().await.unwrap();
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/api/v1/access_token")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;
        let client = mock_client(&server);

        match client.ensure_authenticated().await {
            Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. })) => {}
            other => panic!("Expected AuthenticationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_maps_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _search = server
            .mock("GET", "/r/all/search")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "12")
            .create_async()
            .await;
        let client = mock_client(&server);

        match client.search(&google_params()).await {
            Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })) => {
                assert_eq!(retry_after, 12)
            }
            other => panic!("Expected RateLimitExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_response_drops_token() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _search = server
            .mock("GET", "/r/all/search")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;
        let client = mock_client(&server);

        let result = client.search(&google_params()).await;
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::InvalidToken))
        ));
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_harvest_against_mock_reddit() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;

        let search_mock = server
            .mock("GET", "/r/stocks/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "Google".into()),
                mockito::Matcher::UrlEncoded("t".into(), "week".into()),
                mockito::Matcher::UrlEncoded("restrict_sr".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "kind": "Listing",
                    "data": {"children": [{"kind": "t3", "data": {
                        "id": "abc",
                        "title": "Google hits all-time high",
                        "selftext": "GOOGL closed at a record today.",
                        "author": "trader",
                        "subreddit": "stocks",
                        "permalink": "/r/stocks/comments/abc/google/",
                        "created_utc": 1700000000.0,
                        "score": 120,
                        "num_comments": 4,
                        "is_self": true
                    }}]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let _comments = server
            .mock("GET", "/comments/abc")
            .match_query(mockito::Matcher::UrlEncoded("sort".into(), "best".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    listing(vec![json!({"kind": "t3", "data": {"id": "abc"}})]),
                    listing(vec![
                        comment("c1", "t3_abc", listing(vec![comment("c2", "t1_c1", json!(""))])),
                        more("t3_abc", &["c3", "c4"]),
                    ])
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let more_mock = server
            .mock("GET", "/api/morechildren")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("link_id".into(), "t3_abc".into()),
                mockito::Matcher::UrlEncoded("children".into(), "c3,c4".into()),
                mockito::Matcher::UrlEncoded("api_type".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"json": {"errors": [], "data": {"things": [
                    comment("c3", "t3_abc", json!("")),
                    comment("c4", "t1_c3", json!(""))
                ]}}})
                .to_string(),
            )
            .create_async()
            .await;

        let client = mock_client(&server);
        let params = SearchParameters {
            subreddit: "stocks".to_string(),
            ..google_params()
        };
        let results = harvest(&client, &params, &test_config(), "0.1.0").await;

        search_mock.assert_async().await;
        more_mock.assert_async().await;

        assert_eq!(results.posts.len(), 1);
        let post = &results.posts[0];
        assert_eq!(post.title, "Google hits all-time high");
        assert_eq!(post.permalink, "https://reddit.com/r/stocks/comments/abc/google/");
        assert_eq!(ids(&post.comments), vec!["c1", "c2", "c3", "c4"]);
        let depths: Vec<_> = post.comments.iter().map(|c| c.depth).collect();
        assert_eq!(depths, vec![0, 1, 0, 1]);
        assert_eq!(results.results_summary.total_comments, 4);
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let gone = server
            .mock("GET", "/api/morechildren")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let client = mock_client(&server);

        let mut tree = CommentTree::from_listing(
            "abc",
            listing(vec![
                comment("c1", "t3_abc", json!("")),
                more("t3_abc", &["c3", "c4"]),
            ]),
        );
        let report = flatten_with_report(&client, &mut tree, &test_config(), 0).await;

        gone.assert_async().await;
        assert_eq!(ids(&report.comments), vec!["c1"]);
        match report.last_outcome {
            Some(BatchOutcome::Exhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("Expected exhausted batch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_maps_to_post_and_subreddit() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _comments = server
            .mock("GET", "/comments/gone")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let _search = server
            .mock("GET", "/r/nosuchsub/search")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let client = mock_client(&server);

        match client.comment_tree("gone").await {
            Err(CoreError::RedditApi(RedditApiError::PostNotFound { post_id })) => {
                assert_eq!(post_id, "gone")
            }
            other => panic!("Expected PostNotFound, got {:?}", other.map(|_| ())),
        }

        let params = SearchParameters {
            subreddit: "nosuchsub".to_string(),
            ..google_params()
        };
        match client.search(&params).await {
            Err(CoreError::RedditApi(RedditApiError::SubredditNotFound { subreddit })) => {
                assert_eq!(subreddit, "nosuchsub")
            }
            other => panic!("Expected SubredditNotFound, got {:?}", other),
        }
    }

    // Pauses between batches and between attempts

    fn paced_config() -> FlattenConfig {
        FlattenConfig {
            inter_batch_delay_secs: 1,
            ..test_config()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_after_batch_with_pending_placeholders() {
        let source = ScriptedSource::new(expansions_for_two_placeholders());
        let mut tree = tree_with_two_placeholders();
        let config = FlattenConfig {
            batch_size: 1,
            ..paced_config()
        };

        let started = tokio::time::Instant::now();
        let report = flatten_with_report(&source, &mut tree, &config, 0).await;
        let elapsed = started.elapsed();

        assert_eq!(report.batches, 2);
        assert_eq!(report.last_outcome, Some(BatchOutcome::Resolved));
        // One pause after the first batch, none after the last
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_retry_attempts() {
        let source = ScriptedSource::new(expansions_for_two_placeholders()).failing(1);
        let mut tree = tree_with_two_placeholders();

        let started = tokio::time::Instant::now();
        let report = flatten_with_report(&source, &mut tree, &paced_config(), 0).await;
        let elapsed = started.elapsed();

        assert_eq!(source.calls(), 2);
        assert_eq!(report.batches, 1);
        assert_eq!(report.last_outcome, Some(BatchOutcome::Resolved));
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_without_delay() {
        let source = ScriptedSource::new(expansions_for_two_placeholders()).failing(1);
        let mut tree = tree_with_two_placeholders();
        let config = FlattenConfig {
            batch_size: 1,
            ..test_config()
        };

        let started = tokio::time::Instant::now();
        flatten_with_report(&source, &mut tree, &config, 0).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
