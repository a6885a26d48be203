use github::{GithubClient, GithubConfig};
use mockito::{Matcher, Server};
use pipeline::{
    BranchName, ClassroomApi, CollaboratorStatus, ErrorKind, GithubUsername,
    MergeUpstreamOutcome, OrgName, Permission, RepositoryId, SecretName, SecretValue,
};

fn client(server: &Server) -> GithubClient {
    GithubClient::new(GithubConfig::new("ghp_test").with_base_url(server.url())).unwrap()
}

fn repo() -> RepositoryId {
    RepositoryId::parse("cs101/hw1-alice").unwrap()
}

fn alice() -> GithubUsername {
    GithubUsername::new("alice").unwrap()
}

#[tokio::test]
async fn lists_organization_repositories() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex("^/orgs/cs101/repos".into()))
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "100".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
        ]))
        .match_header("authorization", "Bearer ghp_test")
        .with_status(200)
        .with_body(
            r#"[
                {"name":"hw1-alice","owner":{"login":"cs101"},"html_url":"https://github.com/cs101/hw1-alice","archived":false},
                {"name":"hw1-old","owner":{"login":"cs101"},"html_url":"https://github.com/cs101/hw1-old","archived":true,"is_template":false}
            ]"#,
        )
        .create_async()
        .await;

    let repos = client(&server)
        .list_org_repositories(&OrgName::new("cs101").unwrap(), 2)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(repos.len(), 2);
    assert_eq!(repos[0].id, repo());
    assert!(repos[1].archived);
}

#[tokio::test]
async fn rate_limited_listing_carries_reset_time() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex("^/orgs/cs101/repos".into()))
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1900000000")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .list_org_repositories(&OrgName::new("cs101").unwrap(), 1)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert!(err.rate_limit_reset().is_some());
}

#[tokio::test]
async fn default_branch_head_follows_the_default_branch() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/cs101/hw1-alice")
        .with_status(200)
        .with_body(r#"{"name":"hw1-alice","owner":{"login":"cs101"},"html_url":"x","default_branch":"trunk"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/cs101/hw1-alice/branches/trunk")
        .with_status(200)
        .with_body(r#"{"name":"trunk","commit":{"sha":"abc123"}}"#)
        .create_async()
        .await;

    let head = client(&server).default_branch_head(&repo()).await.unwrap();
    assert_eq!(head.branch.as_str(), "trunk");
    assert_eq!(head.sha.as_str(), "abc123");
}

#[tokio::test]
async fn merge_upstream_maps_merge_type_and_conflicts() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("POST", "/repos/cs101/hw1-alice/merge-upstream")
        .match_body(Matcher::Json(serde_json::json!({"branch": "main"})))
        .with_status(200)
        .with_body(r#"{"message":"ok","merge_type":"fast-forward","base_branch":"prof:main"}"#)
        .expect(1)
        .create_async()
        .await;

    let api = client(&server);
    let main = BranchName::new("main").unwrap();
    assert_eq!(
        api.merge_upstream(&repo(), &main).await.unwrap(),
        MergeUpstreamOutcome::FastForward
    );
    ok.assert_async().await;
    ok.remove_async().await;

    server
        .mock("POST", "/repos/cs101/hw1-alice/merge-upstream")
        .with_status(409)
        .with_body(r#"{"message":"merge conflict"}"#)
        .create_async()
        .await;
    let err = api.merge_upstream(&repo(), &main).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
}

#[tokio::test]
async fn secrets_are_listed_and_written_sealed() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex("^/repos/cs101/hw1-alice/actions/secrets($|\\?)".into()))
        .with_status(200)
        .with_body(r#"{"total_count":1,"secrets":[{"name":"GRADER_TOKEN"}]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/cs101/hw1-alice/actions/secrets/public-key")
        .with_status(200)
        // 32 zero bytes.
        .with_body(r#"{"key_id":"568250167242549743","key":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}"#)
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/repos/cs101/hw1-alice/actions/secrets/API_KEY")
        .match_body(Matcher::PartialJson(
            serde_json::json!({"key_id": "568250167242549743"}),
        ))
        .with_status(201)
        .create_async()
        .await;

    let api = client(&server);
    let names = api.list_secret_names(&repo()).await.unwrap();
    assert_eq!(names, [SecretName::new("GRADER_TOKEN").unwrap()]);

    api.put_secret(
        &repo(),
        &SecretName::new("API_KEY").unwrap(),
        &SecretValue::new("hunter2"),
    )
    .await
    .unwrap();
    put.assert_async().await;
}

#[tokio::test]
async fn collaborator_status_checks_invitations_when_not_a_collaborator() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/cs101/hw1-alice/collaborators/alice")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex("^/repos/cs101/hw1-alice/invitations".into()))
        .with_status(200)
        .with_body(r#"[{"id":7,"invitee":{"login":"bob"}},{"id":8,"invitee":{"login":"Alice"}}]"#)
        .create_async()
        .await;

    let status = client(&server)
        .collaborator_status(&repo(), &alice())
        .await
        .unwrap();
    assert_eq!(status, CollaboratorStatus::PendingInvitation { invitation_id: 8 });
}

#[tokio::test]
async fn active_collaborator_is_204() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/cs101/hw1-alice/collaborators/alice")
        .with_status(204)
        .create_async()
        .await;

    let status = client(&server)
        .collaborator_status(&repo(), &alice())
        .await
        .unwrap();
    assert_eq!(status, CollaboratorStatus::Active);
}

#[tokio::test]
async fn remove_cancels_pending_invitation() {
    let mut server = Server::new_async().await;
    let remove = server
        .mock("DELETE", "/repos/cs101/hw1-alice/collaborators/alice")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex("^/repos/cs101/hw1-alice/invitations".into()))
        .with_status(200)
        .with_body(r#"[{"id":42,"invitee":{"login":"alice"}}]"#)
        .create_async()
        .await;
    let cancel = server
        .mock("DELETE", "/repos/cs101/hw1-alice/invitations/42")
        .with_status(204)
        .create_async()
        .await;

    client(&server)
        .remove_collaborator(&repo(), &alice())
        .await
        .unwrap();
    remove.assert_async().await;
    cancel.assert_async().await;
}

#[tokio::test]
async fn invite_sends_permission() {
    let mut server = Server::new_async().await;
    let invite = server
        .mock("PUT", "/repos/cs101/hw1-alice/collaborators/alice")
        .match_body(Matcher::Json(serde_json::json!({"permission": "push"})))
        .with_status(201)
        .with_body(r#"{"id":99}"#)
        .create_async()
        .await;

    client(&server)
        .invite_collaborator(&repo(), &alice(), Permission::Push)
        .await
        .unwrap();
    invite.assert_async().await;
}

#[tokio::test]
async fn bad_credentials_are_auth_failures() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/cs101/hw1-alice/collaborators/alice")
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .collaborator_status(&repo(), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthFailure);
    assert!(err.message.contains("Bad credentials"));
}

#[test]
fn empty_token_is_rejected() {
    assert!(matches!(
        GithubClient::new(GithubConfig::new("  ")),
        Err(github::ClientError::MissingToken)
    ));
}
