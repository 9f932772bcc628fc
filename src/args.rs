use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Posture and wellness scoring over recorded keypoints", long_about = None)]
pub struct Args {
    /// Recorded keypoint frames, one JSON object per line
    #[arg(short, long)]
    pub frames: Option<PathBuf>,

    /// User the session and samples belong to
    #[arg(short, long, default_value = "local")]
    pub uid: String,

    /// SQLite database file
    #[arg(long, default_value = "posture-ai.db")]
    pub db: PathBuf,

    /// JSON settings file (defaults are used when missing)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Delay between replayed frames in milliseconds
    #[arg(long, default_value_t = 120)]
    pub pace_ms: u64,

    /// Print the weekly summary for the user and exit
    #[arg(long)]
    pub summary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["posture-ai", "--frames", "session.jsonl"]);
        assert_eq!(args.frames, Some(PathBuf::from("session.jsonl")));
        assert_eq!(args.uid, "local");
        assert_eq!(args.db, PathBuf::from("posture-ai.db"));
        assert_eq!(args.pace_ms, 120);
        assert!(!args.summary);
    }

    #[test]
    fn test_summary_mode() {
        let args = Args::parse_from(["posture-ai", "--summary", "-u", "user-7", "--db", "/tmp/p.db"]);
        assert!(args.summary);
        assert_eq!(args.uid, "user-7");
        assert!(args.frames.is_none());
    }
}
