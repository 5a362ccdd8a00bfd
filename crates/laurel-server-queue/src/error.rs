// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("Database error: {0}")]
	Db(#[from] laurel_server_db::DbError),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Malformed payload on job {id}: {message}")]
	MalformedPayload { id: Uuid, message: String },
}

impl From<sqlx::Error> for QueueError {
	fn from(e: sqlx::Error) -> Self {
		QueueError::Db(laurel_server_db::DbError::Sqlx(e))
	}
}

pub type Result<T> = std::result::Result<T, QueueError>;
