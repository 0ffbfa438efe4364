#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Drives the hostname and requests queues.
    Crawler,
    /// Drives the selenium queue.
    Loader,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Crawler => "crawler",
            Stage::Loader => "loader",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crawler" => Ok(Stage::Crawler),
            "loader" => Ok(Stage::Loader),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}
