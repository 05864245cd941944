//! Scripted stand-in for the `yt-dlp` binary
//!
//! The script answers the handful of invocations tubarr makes (channel info,
//! flat listings, playlist dumps, downloads) from JSON files in a fixture
//! directory, and appends every argument list to `calls.log`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SCRIPT: &str = r#"#!/bin/sh
FIXTURES='@FIXTURES@'
template=''
prev=''
url=''
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then template="$arg"; fi
  prev="$arg"
  url="$arg"
done
echo "$*" >> "$FIXTURES/calls.log"

case "$*" in
  *"--playlist-items 0"*)
    cat "$FIXTURES/channel.json"
    ;;
  *--dump-json*)
    cat "$FIXTURES/videos.jsonl"
    ;;
  */playlists*)
    cat "$FIXTURES/playlists.json"
    ;;
  *"list="*)
    id="${url##*list=}"
    if [ -f "$FIXTURES/playlist-$id.json" ]; then
      cat "$FIXTURES/playlist-$id.json"
    else
      echo "ERROR: [youtube:tab] $id: The playlist does not exist." >&2
      exit 1
    fi
    ;;
  *--no-simulate*)
    id="${url##*v=}"
    if [ -f "$FIXTURES/unavailable-$id" ]; then
      echo "ERROR: [youtube] $id: Video unavailable" >&2
      exit 1
    fi
    title="Title $id"
    path=$(printf '%s' "$template" | sed -e "s/%(title)s/$title/g" -e "s/%(id)s/$id/g" -e 's/%(upload_date)s/20240301/g' -e 's/%(ext)s/mkv/g' -e 's/%%/%/g')
    mkdir -p "$(dirname "$path")"
    printf 'video' > "$path"
    printf '[download] Destination: %s\n' "$path"
    printf '{"filepath": "%s", "title": "%s", "upload_date": "20240301", "duration": 125.0, "description": "About %s", "thumbnail": null}\n' "$path" "$title" "$id"
    ;;
  *)
    echo "ERROR: unexpected invocation: $*" >&2
    exit 2
    ;;
esac
"#;

/// Remote id of the scripted channel
pub const CHANNEL_ID: &str = "UCfake";
/// Display name of the scripted channel
pub const CHANNEL_NAME: &str = "Fake Channel";
/// URL used to add the scripted channel
pub const CHANNEL_URL: &str = "https://www.youtube.com/@fake";

/// A fake `yt-dlp` executable and the fixtures it serves
pub struct FakeYtDlp {
    dir: PathBuf,
}

impl FakeYtDlp {
    /// Install the script in `dir` with a channel listing `videos`
    pub fn install(dir: &Path, videos: &[&str]) -> Self {
        std::fs::create_dir_all(dir).unwrap();
        let fake = Self {
            dir: dir.to_path_buf(),
        };

        let script = SCRIPT.replace("@FIXTURES@", &dir.to_string_lossy());
        std::fs::write(fake.binary(), script).unwrap();
        std::fs::set_permissions(fake.binary(), std::fs::Permissions::from_mode(0o755)).unwrap();

        fake.write(
            "channel.json",
            &serde_json::json!({
                "id": CHANNEL_ID,
                "channel_id": CHANNEL_ID,
                "channel": CHANNEL_NAME,
                "channel_url": format!("https://www.youtube.com/channel/{CHANNEL_ID}"),
                "description": "A channel that only exists in tests",
            })
            .to_string(),
        );
        fake.set_videos(videos);
        fake.write("playlists.json", &serde_json::json!({ "entries": [] }).to_string());
        fake.write("calls.log", "");
        fake
    }

    /// Path of the executable
    pub fn binary(&self) -> PathBuf {
        self.dir.join("yt-dlp")
    }

    /// Replace the channel's flat listing
    pub fn set_videos(&self, videos: &[&str]) {
        let lines: Vec<String> = videos
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "title": format!("Listed {id}"),
                    "duration": 60.0,
                })
                .to_string()
            })
            .collect();
        self.write("videos.jsonl", &lines.join("\n"));
    }

    /// Serve a playlist with the given entries
    pub fn add_playlist(&self, id: &str, title: &str, entries: &[&str]) {
        let entries: Vec<_> = entries
            .iter()
            .map(|e| serde_json::json!({ "id": e, "title": format!("Listed {e}") }))
            .collect();
        self.write(
            &format!("playlist-{id}.json"),
            &serde_json::json!({
                "id": id,
                "title": title,
                "playlist_count": entries.len(),
                "entries": entries,
            })
            .to_string(),
        );
    }

    /// Make downloads of `remote_id` fail as unavailable
    pub fn make_unavailable(&self, remote_id: &str) {
        self.write(&format!("unavailable-{remote_id}"), "");
    }

    /// Every recorded invocation, one argument string per line
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Download invocations for one remote id
    pub fn download_calls(&self, remote_id: &str) -> usize {
        let url = format!("watch?v={remote_id}");
        self.calls()
            .iter()
            .filter(|c| c.contains("--no-simulate") && c.ends_with(&url))
            .count()
    }

    fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.join(name), contents).unwrap();
    }
}
