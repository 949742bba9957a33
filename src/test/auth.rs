#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::json;

    use crate::api::auth::SessionResponse;
    use crate::auth::{Role, SESSION_COOKIE};
    use crate::db::{count_admins, create_first_admin, get_user};
    use crate::error::AppError;
    use crate::models::AdminAccount;
    use crate::test::utils::{
        STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db, login_test_user, new_user,
        setup_test_client,
    };
    use crate::validation::ErrorResponse;

    #[rocket::async_test]
    async fn test_login_sets_session_cookie() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(
                json!({ "email": "Admin@Example.com", "password": STANDARD_PASSWORD }).to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get(SESSION_COOKIE).is_some());

        let session: SessionResponse = response.into_json().await.unwrap();
        assert_eq!(session.user.email, "admin@example.com");
        assert_eq!(session.user.role, Role::Admin);
        assert_eq!(session.user.name, "Ada Admin");

        let days_left = (session.expires - chrono::Utc::now()).num_days();
        assert!((29..=30).contains(&days_left));

        let response = client.get("/api/auth/session").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let current: SessionResponse = response.into_json().await.unwrap();
        assert_eq!(current.user.id, test_db.id("admin@example.com"));
    }

    #[rocket::async_test]
    async fn test_login_rejects_bad_credentials() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        for (email, password) in [
            ("admin@example.com", "wrong_password"),
            ("nobody@example.com", STANDARD_PASSWORD),
        ] {
            let response = client
                .post("/api/auth/login")
                .header(ContentType::JSON)
                .body(json!({ "email": email, "password": password }).to_string())
                .dispatch()
                .await;

            assert_eq!(response.status(), Status::Unauthorized);
            let body: ErrorResponse = response.into_json().await.unwrap();
            assert_eq!(body.message, "Invalid email or password");
        }
    }

    #[rocket::async_test]
    async fn test_logout_ends_session() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        assert_eq!(
            login_test_user(&client, "worker@example.com", STANDARD_PASSWORD).await,
            Status::Ok
        );

        let response = client.post("/api/auth/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/auth/session").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_protected_routes_require_session() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        for endpoint in ["/api/church", "/api/positions", "/api/subjects", "/api/users"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "{} did not require authentication",
                endpoint
            );
            let body: ErrorResponse = response.into_json().await.unwrap();
            assert_eq!(body.message, "Authentication required");
        }

        let forged = Cookie::build((SESSION_COOKIE, "not.a.token")).build();
        let response = client.get("/api/church").cookie(forged).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_worker_cannot_manage_directory() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_test_user(&client, "worker@example.com", STANDARD_PASSWORD).await;

        let response = client.get("/api/church").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .post("/api/church")
            .header(ContentType::JSON)
            .body(json!({ "address": "1 Main St", "latitude": 1, "longitude": 2 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client.get("/api/users/workers").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_worker_reads_own_profile_only() {
        let test_db = TestDbBuilder::new()
            .worker("one@example.com", "One", "Worker")
            .worker("two@example.com", "Two", "Worker")
            .build()
            .await
            .unwrap();
        let client = setup_test_client(&test_db).await;
        login_test_user(&client, "one@example.com", STANDARD_PASSWORD).await;

        let own = format!("/api/users/workers/{}", test_db.id("one@example.com"));
        let other = format!("/api/users/workers/{}", test_db.id("two@example.com"));

        assert_eq!(client.get(own).dispatch().await.status(), Status::Ok);
        assert_eq!(client.get(other).dispatch().await.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_create_admin_bootstraps_first_account() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let client = setup_test_client(&test_db).await;

        let payload = json!({
            "firstName": "First",
            "lastName": "Admin",
            "email": "first@example.com",
            "password": "bootstrap-pass"
        });

        let response = client
            .post("/api/create-admin")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);
        let admin: AdminAccount = response.into_json().await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.firstname.as_deref(), Some("First"));

        let response = client
            .post("/api/create-admin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "firstName": "Second",
                    "lastName": "Admin",
                    "email": "second@example.com",
                    "password": "bootstrap-pass"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        assert_eq!(
            login_test_user(&client, "first@example.com", "bootstrap-pass").await,
            Status::Ok
        );
    }

    #[rocket::async_test]
    async fn test_first_admin_only_created_once() {
        let test_db = TestDbBuilder::new().build().await.unwrap();

        let id = create_first_admin(&test_db.pool, &new_user("first@example.com", "First", "Admin"))
            .await
            .unwrap();
        let admin = get_user(&test_db.pool, id, Some(Role::Admin)).await.unwrap();
        assert_eq!(admin.email, "first@example.com");

        let result =
            create_first_admin(&test_db.pool, &new_user("second@example.com", "Second", "Admin"))
                .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
        assert_eq!(count_admins(&test_db.pool).await.unwrap(), 1);
    }
}
