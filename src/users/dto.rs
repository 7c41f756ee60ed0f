use serde::{Deserialize, Serialize};

use super::model::User;

/// Body of `PATCH /users/:id`. Password fields are accepted only so they can
/// be refused explicitly.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub password: Option<serde_json::Value>,
    pub confirm_password: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub data: UserBody,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: UserListBody,
}

#[derive(Debug, Serialize)]
pub struct UserListBody {
    pub users: Vec<User>,
}

impl UserResponse {
    pub fn success(user: User) -> Self {
        Self {
            status: "success",
            data: UserBody { user },
        }
    }
}

impl UserListResponse {
    pub fn success(users: Vec<User>) -> Self {
        Self {
            status: "success",
            results: users.len(),
            data: UserListBody { users },
        }
    }
}
