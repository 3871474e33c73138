use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
	#[error("failed to load sprite for group `{group}` from {url}: {reason}")]
	TextureLoad {
		group: String,
		url: String,
		reason: String,
	},
	#[error("load generation {generation} was superseded by generation {current}")]
	Superseded { generation: u64, current: u64 },
	#[error("graph has {count} nodes but the pick index space holds at most {max}")]
	TooManyNodes { count: usize, max: usize },
	#[error("pixel readback failed: {0}")]
	PixelReadback(String),
	#[error("render backend error: {0}")]
	Backend(String),
	#[error("invalid graph data: {0}")]
	InvalidData(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
