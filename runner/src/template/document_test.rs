use super::{
    document::{ConfigDocument, NameFormats, ParameterTarget, DEFAULT_INPUT_FILE, INPUT_FILE},
    TemplateError,
};
use std::{fs, path::Path};

const TEMPLATE: &str = "\
; Simulation template
EXE-FILE: /bin/sim
APER-MAP: maps/default.txt
INLET-PRESS: 100 PA
;  OUTLET-PRESS: 0 PA
SUMMARY-FILE: summary.txt
STAT-FILE: stat.csv
";

fn formats(entries: &[(&str, &str)]) -> NameFormats {
    entries
        .iter()
        .map(|(name, format)| (name.to_string(), format.to_string()))
        .collect()
}

fn to_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
pub fn parse_requires_executable() {
    let result = ConfigDocument::parse("APER-MAP: a.txt\n", NameFormats::new());

    assert!(matches!(result, Err(TemplateError::MissingExecutable)));
}

#[test]
pub fn parse_fields() {
    let document = ConfigDocument::parse(TEMPLATE, NameFormats::new()).unwrap();

    assert_eq!(document.executable(), "/bin/sim");
    assert_eq!(document.line_count(), 7);
    assert_eq!(document.field("inlet-press").unwrap().value(), "100");

    let outlet = document.field("OUTLET-PRESS").unwrap();
    assert!(outlet.is_disabled());
    // whitespace after leading comment markers is dropped
    assert_eq!(outlet.render(), ";OUTLET-PRESS: 0 PA");

    assert_eq!(
        document.formats().get(INPUT_FILE).map(String::as_str),
        Some(DEFAULT_INPUT_FILE)
    );
}

#[test]
pub fn duplicate_keywords_render_latest_line() {
    let mut document =
        ConfigDocument::parse("EXE-FILE: a\nMODE: 1\nMODE: 2\n", NameFormats::new()).unwrap();

    assert_eq!(document.line_count(), 3);
    assert_eq!(document.field("MODE").unwrap().value(), "2");
    assert_eq!(document.render().unwrap(), "EXE-FILE: a\nMODE: 2\nMODE: 2\n");
}

#[test]
pub fn clone_is_isolated() {
    let template = ConfigDocument::parse(TEMPLATE, NameFormats::new()).unwrap();
    let mut clone = template.clone_with_formats(None);

    clone.update([("INLET-PRESS", "250")]);

    assert_eq!(clone.field("INLET-PRESS").unwrap().value(), "250");
    assert_eq!(template.field("INLET-PRESS").unwrap().value(), "100");
}

#[test]
pub fn clone_formats_override() {
    let template =
        ConfigDocument::parse(TEMPLATE, formats(&[("STAT-FILE", "a/%APER-MAP%.csv")])).unwrap();

    let inherited = template.clone_with_formats(None);
    assert_eq!(inherited.formats(), template.formats());

    let replaced = template.clone_with_formats(Some(&formats(&[("SUMMARY-FILE", "b.txt")])));
    assert!(replaced.formats().get("STAT-FILE").is_none());
    assert_eq!(
        replaced.formats().get("SUMMARY-FILE").map(String::as_str),
        Some("b.txt")
    );
    assert!(replaced.formats().contains_key(INPUT_FILE));
}

#[test]
pub fn update_routes_unknown_keys_to_placeholders() {
    let mut document = ConfigDocument::parse(TEMPLATE, NameFormats::new()).unwrap();

    assert_eq!(document.target("apER-map"), ParameterTarget::Field);
    assert_eq!(document.target("run-id"), ParameterTarget::Placeholder);

    document.update([("APER-MAP", "maps/b.txt"), ("run-id", "7")]);

    assert_eq!(document.field("APER-MAP").unwrap().value(), "maps/b.txt");
    assert_eq!(document.placeholders().get("run-id"), Some("7"));
    assert!(document.field("run-id").is_none());
}

#[test]
pub fn resolve_output_paths_substitutes_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let root = to_str(dir.path());
    let input_format = format!("{root}/inp/%inlet-press%-%run%.INP");
    let stat_format = format!("{root}/stats/%INLET-PRESS%/stat.csv");
    let mut document = ConfigDocument::parse(
        TEMPLATE,
        formats(&[
            (INPUT_FILE, input_format.as_str()),
            ("STAT-FILE", stat_format.as_str()),
        ]),
    )
    .unwrap();

    document.update([("INLET-PRESS", "150"), ("run", "3")]);
    let input = document.resolve_output_paths().unwrap().to_path_buf();

    assert_eq!(input, dir.path().join("inp/150-3.INP"));
    assert_eq!(document.input_path(), input.as_path());
    assert_eq!(
        document.field("STAT-FILE").unwrap().value(),
        format!("{root}/stats/150/stat.csv")
    );
    assert!(dir.path().join("stats/150").is_dir());
}

#[test]
pub fn resolve_output_paths_rejects_undeclared_output() {
    let mut document =
        ConfigDocument::parse(TEMPLATE, formats(&[("VTK-FILE", "out.vtk")])).unwrap();

    match document.resolve_output_paths() {
        Err(TemplateError::UndefinedOutput(name)) => assert_eq!(name, "VTK-FILE"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
pub fn write_to_disk_renders_in_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = ConfigDocument::parse(
        TEMPLATE,
        formats(&[(INPUT_FILE, "runs/%OUTLET-PRESS%.INP")]),
    )
    .unwrap();

    document.update([("OUTLET-PRESS", "5")]);
    let path = document.write_to_disk(Some(dir.path())).unwrap();

    assert_eq!(path, dir.path().join("runs/5.INP"));
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "\
;Simulation template
EXE-FILE: /bin/sim
APER-MAP: maps/default.txt
INLET-PRESS: 100 PA
OUTLET-PRESS: 5 PA
SUMMARY-FILE: summary.txt
STAT-FILE: stat.csv
"
    );
}
