#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};

    use crate::auth::{Role, verify_password};
    use crate::listing::Paginated;
    use crate::models::{AdminAccount, MaritalStatus, UserDetail};
    use crate::test::utils::{
        STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db, login_admin, login_test_user,
        setup_test_client,
    };
    use crate::validation::ErrorResponse;

    fn worker_payload(email: &str) -> Value {
        json!({
            "email": email,
            "password": "worker-pass",
            "confirmPassword": "worker-pass",
            "firstname": "Grace",
            "lastname": "Hopper",
            "birthday": "1985-06-15",
            "gender": "female",
            "status": "married",
            "children": [
                { "firstname": "Ann", "lastname": "Hopper", "birthday": "2010-01-02", "gender": "female" },
                { "firstname": "Ben", "lastname": "Hopper", "birthday": "2012-03-04T00:00:00.000Z", "gender": "male" }
            ],
            "educationalAttainment": [
                { "schoolname": "State University", "education": "Bachelor" }
            ],
            "cases": [
                { "year": 2019, "where": "Manila", "case": "Traffic", "reason": "Parking" }
            ]
        })
    }

    #[rocket::async_test]
    async fn test_worker_with_dependents_round_trip() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(worker_payload("grace@example.com").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let worker: UserDetail = response.into_json().await.unwrap();
        assert_eq!(worker.user.role, Role::Worker);
        assert_eq!(worker.user.status, Some(MaritalStatus::Married));
        assert_eq!(worker.children.len(), 2);
        assert_eq!(worker.educational_attainment.len(), 1);
        assert_eq!(worker.cases[0].place, "Manila");
        assert_eq!(worker.cases[0].case_name, "Traffic");

        let response = client
            .put(format!("/api/users/workers/{}", worker.user.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "children": [
                        { "firstname": "Cal", "lastname": "Hopper", "birthday": "2015-05-05", "gender": "male" }
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let updated: UserDetail = response.into_json().await.unwrap();
        assert_eq!(updated.children.len(), 1);
        assert_eq!(updated.children[0].firstname, "Cal");
        assert_eq!(updated.educational_attainment.len(), 1);
        assert_eq!(updated.cases.len(), 1);
        assert_eq!(updated.user.firstname.as_deref(), Some("Grace"));

        let body = client
            .get(format!("/api/users/workers/{}", worker.user.id))
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        assert!(!body.contains("\"password\""));
        assert!(body.contains("\"where\":\"Manila\""));
    }

    #[rocket::async_test]
    async fn test_failed_dependent_write_rolls_back_update() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(worker_payload("grace@example.com").to_string())
            .dispatch()
            .await;
        let worker: UserDetail = response.into_json().await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_cases BEFORE INSERT ON user_cases
             BEGIN SELECT RAISE(ABORT, 'cases are read-only'); END",
        )
        .execute(&test_db.pool)
        .await
        .unwrap();

        let response = client
            .put(format!("/api/users/workers/{}", worker.user.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "firstname": "Changed",
                    "children": [],
                    "cases": [
                        { "year": 2021, "where": "Cebu", "case": "Noise", "reason": "Party" }
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::InternalServerError);

        let response = client
            .get(format!("/api/users/workers/{}", worker.user.id))
            .dispatch()
            .await;
        let unchanged: UserDetail = response.into_json().await.unwrap();
        assert_eq!(unchanged.user.firstname.as_deref(), Some("Grace"));
        assert_eq!(unchanged.children.len(), 2);
        assert_eq!(unchanged.cases.len(), 1);
        assert_eq!(unchanged.cases[0].place, "Manila");
    }

    #[rocket::async_test]
    async fn test_worker_password_is_hashed() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(worker_payload("Grace@Example.com").to_string())
            .dispatch()
            .await;
        let worker: UserDetail = response.into_json().await.unwrap();
        assert_eq!(worker.user.email, "grace@example.com");

        let stored: String = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
            .bind(worker.user.id)
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
        assert_ne!(stored, "worker-pass");
        assert!(verify_password("worker-pass", &stored));

        let response = client
            .put(format!("/api/users/workers/{}", worker.user.id))
            .header(ContentType::JSON)
            .body(json!({ "password": "", "contact": "0917" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let unchanged: String = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
            .bind(worker.user.id)
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
        assert_eq!(unchanged, stored);

        client.post("/api/auth/logout").dispatch().await;
        assert_eq!(
            login_test_user(&client, "grace@example.com", "worker-pass").await,
            Status::Ok
        );
    }

    #[rocket::async_test]
    async fn test_worker_create_validation() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let mut payload = worker_payload("new@example.com");
        payload["confirmPassword"] = json!("something-else");
        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "Passwords do not match");

        let mut payload = worker_payload("new@example.com");
        payload.as_object_mut().unwrap().remove("birthday");
        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await;
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "Birthday is required");

        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(worker_payload("worker@example.com").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "Email already in use");

        let mut payload = worker_payload("short@example.com");
        payload["password"] = json!("short");
        payload["confirmPassword"] = json!("short");
        let response = client
            .post("/api/users/workers")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await;
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "Password must be at least 8 characters");

        let response = client
            .get("/api/users/workers?search=new")
            .dispatch()
            .await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[rocket::async_test]
    async fn test_worker_listing_filters() {
        let test_db = TestDbBuilder::new()
            .admin("admin@example.com", "Ada", "Admin")
            .worker("maria@example.com", "Maria", "Santos")
            .worker("jose@example.com", "Jose", "Rizal")
            .worker("juan@example.com", "Juan", "Luna")
            .build()
            .await
            .unwrap();
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client.get("/api/users/workers").dispatch().await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 3);
        assert!(page.data.iter().all(|w| w.user.role == Role::Worker));

        let response = client
            .get("/api/users/workers?search=rizal")
            .dispatch()
            .await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].user.email, "jose@example.com");

        let response = client
            .get("/api/users/workers?sort=firstname:asc&pageSize=2")
            .dispatch()
            .await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(
            page.data
                .iter()
                .map(|w| w.user.firstname.clone().unwrap())
                .collect::<Vec<_>>(),
            vec!["Jose", "Juan"]
        );

        let response = client.get("/api/users?role=admin").dispatch().await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 1);

        let response = client.get("/api/users?status=widowed").dispatch().await;
        let page: Paginated<UserDetail> = response.into_json().await.unwrap();
        assert_eq!(page.total, 0);

        let response = client.get("/api/users?status=unknown").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn test_worker_routes_ignore_admins() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let admin_id = test_db.id("admin@example.com");

        let response = client
            .get(format!("/api/users/workers/{}", admin_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "Worker not found");

        let response = client
            .delete(format!("/api/users/workers/{}", admin_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_admin_accounts() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client
            .post("/api/users/admin")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "second@example.com",
                    "password": STANDARD_PASSWORD,
                    "confirmPassword": STANDARD_PASSWORD,
                    "firstname": "Second",
                    "children": [
                        { "firstname": "Kid", "lastname": "Admin", "birthday": "2015-01-01", "gender": "male" }
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let admin: AdminAccount = response.into_json().await.unwrap();
        assert_eq!(admin.role, Role::Admin);

        let children: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_children WHERE user_id = ?")
                .bind(admin.id)
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert_eq!(children, 0);

        let response = client.get("/api/users/admin").dispatch().await;
        let page: Paginated<AdminAccount> = response.into_json().await.unwrap();
        assert_eq!(page.total, 2);

        let response = client
            .put(format!("/api/users/admin/{}", admin.id))
            .header(ContentType::JSON)
            .body(json!({ "lastname": "Admin", "role": "worker" }).to_string())
            .dispatch()
            .await;
        let updated: AdminAccount = response.into_json().await.unwrap();
        assert_eq!(updated.lastname.as_deref(), Some("Admin"));
        assert_eq!(updated.role, Role::Admin);

        let own_id = test_db.id("admin@example.com");
        let response = client
            .delete(format!("/api/users/admin/{}", own_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "You cannot delete your own account");

        let response = client
            .delete(format!("/api/users/admin/{}", admin.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_deleting_user_removes_dependents() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;
        login_admin(&client).await;

        let response = client
            .post("/api/users")
            .header(ContentType::JSON)
            .body(worker_payload("temp@example.com").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let user: UserDetail = response.into_json().await.unwrap();
        assert_eq!(user.user.role, Role::Worker);

        let response = client
            .delete(format!("/api/users/{}", user.user.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let remaining: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM user_children WHERE user_id = ?1)
                  + (SELECT COUNT(*) FROM user_cases WHERE user_id = ?1)",
        )
        .bind(user.user.id)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
        assert_eq!(remaining, 0);

        let response = client
            .get(format!("/api/users/{}", user.user.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let body: ErrorResponse = response.into_json().await.unwrap();
        assert_eq!(body.message, "User not found");
    }
}
