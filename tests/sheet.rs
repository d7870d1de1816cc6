use std::io::Read;

use camino::Utf8PathBuf;
use chrono::{FixedOffset, TimeZone, Utc};

use harbor_lister::domain::{Artifact, Inventory, Project, Repository, TagInfo};
use harbor_lister::sheet::{
    GroupCell, PROJECT_COL, REPOSITORY_COL, SHEET_NAME, SheetLayout, SheetWriter,
};

fn tag(name: &str) -> TagInfo {
    TagInfo {
        name: name.to_string(),
        push_time: Some(Utc.with_ymd_and_hms(2023, 12, 31, 18, 0, 0).unwrap()),
    }
}

fn repo(name: &str, artifacts: &[&[&str]]) -> Repository {
    let mut repository = Repository::new(name);
    for (i, tags) in artifacts.iter().enumerate() {
        repository.add_artifact(Artifact {
            digest: format!("sha256:{name}{i}"),
            tags: tags.iter().map(|t| tag(t)).collect(),
        });
    }
    repository
}

fn inventory() -> Inventory {
    let mut library = Project::new("library");
    library.add_repository(repo("nginx", &[&["1.25", "latest"], &["1.24"]]));
    library.add_repository(repo("redis", &[&["7"]]));

    let mut solo = Project::new("solo");
    solo.add_repository(repo("app", &[&["v1"]]));

    Inventory {
        harbor_version: "v2.11.0".to_string(),
        projects: vec![library, solo],
    }
}

fn utc8() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

#[test]
fn layout_groups_rows_per_repository_and_project() {
    let layout = SheetLayout::from_inventory(&inventory(), utc8());

    let tags: Vec<&str> = layout.rows.iter().map(|row| row.tag.as_str()).collect();
    assert_eq!(tags, vec!["1.25", "latest", "1.24", "7", "v1"]);
    assert_eq!(layout.rows[0].row, 1);
    assert_eq!(layout.rows[0].push_time, "2024-01-01 02:00:00");
    assert_eq!(layout.last_row(), 5);

    assert_eq!(
        layout.groups,
        vec![
            GroupCell {
                col: REPOSITORY_COL,
                first_row: 1,
                last_row: 3,
                value: "nginx".to_string(),
            },
            GroupCell {
                col: REPOSITORY_COL,
                first_row: 4,
                last_row: 4,
                value: "redis".to_string(),
            },
            GroupCell {
                col: PROJECT_COL,
                first_row: 1,
                last_row: 4,
                value: "library".to_string(),
            },
            GroupCell {
                col: REPOSITORY_COL,
                first_row: 5,
                last_row: 5,
                value: "app".to_string(),
            },
            GroupCell {
                col: PROJECT_COL,
                first_row: 5,
                last_row: 5,
                value: "solo".to_string(),
            },
        ]
    );
    let merged = layout.groups.iter().filter(|g| g.is_merged()).count();
    assert_eq!(merged, 2);
}

#[test]
fn empty_inventory_has_no_rows() {
    let layout = SheetLayout::from_inventory(
        &Inventory {
            harbor_version: "v2.0.0".to_string(),
            projects: Vec::new(),
        },
        utc8(),
    );
    assert!(layout.rows.is_empty());
    assert!(layout.groups.is_empty());
    assert_eq!(layout.last_row(), 0);
}

#[test]
fn missing_push_time_renders_blank() {
    let mut project = Project::new("p");
    let mut repository = Repository::new("r");
    repository.add_artifact(Artifact {
        digest: "sha256:x".to_string(),
        tags: vec![TagInfo {
            name: "old".to_string(),
            push_time: None,
        }],
    });
    project.add_repository(repository);
    let layout = SheetLayout::from_inventory(
        &Inventory {
            harbor_version: "v2.0.0".to_string(),
            projects: vec![project],
        },
        utc8(),
    );
    assert_eq!(layout.rows[0].push_time, "");
}

#[test]
fn saved_workbook_has_named_sheet_frozen_header_and_merges() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("nested").join("images.xlsx")).unwrap();

    SheetWriter::new(utc8()).save(&inventory(), &path).unwrap();

    let file = std::fs::File::open(path.as_std_path()).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();

    let mut workbook = String::new();
    archive
        .by_name("xl/workbook.xml")
        .unwrap()
        .read_to_string(&mut workbook)
        .unwrap();
    assert!(workbook.contains(&format!(r#"name="{SHEET_NAME}""#)));

    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut sheet)
        .unwrap();
    assert!(sheet.contains(r#"state="frozen""#));
    assert!(sheet.contains(r#"<mergeCell ref="B2:B4"/>"#));
    assert!(sheet.contains(r#"<mergeCell ref="A2:A5"/>"#));
    assert!(!sheet.contains(r#"<mergeCell ref="A6"#));

    let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("nested"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".harbor-lister-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn save_overwrites_existing_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("images.xlsx")).unwrap();
    std::fs::write(path.as_std_path(), b"stale").unwrap();

    SheetWriter::new(utc8()).save(&inventory(), &path).unwrap();

    harbor_lister::fs_util::validate_xlsx(path.as_std_path()).unwrap();
}
