use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn harness() -> Command {
    let mut cmd = Command::cargo_bin("lumen-harness").expect("binary exists");
    cmd.arg("--headless");
    cmd
}

#[test]
fn cli_applies_updates_and_prints_final_state() {
    let mut cmd = harness();
    cmd.args(["--size", "800x600", "--dpr", "2"])
        .args(["--set", "uLightDiff-x=50"]);
    cmd.assert()
        .success()
        .stdout(contains("Linked program with 4 uniform control(s)"))
        .stdout(contains("Applied uLightDiff-x=50"))
        .stdout(contains(
            " - uLightDiff (Light: Diffuse) = (50.00, 204.00, 25.10) [bound]",
        ))
        .stdout(contains(
            " - uSphereDiff (Sphere: Diffuse) = (255.00, 255.00, 255.00) [bound]",
        ))
        .stdout(contains(
            "Rendered 2 frame(s): 2 draw call(s), 8 control upload(s)",
        ))
        .stdout(contains("Viewport: 1600x1200"));
}

#[test]
fn cli_reports_discarded_updates() {
    let mut cmd = harness();
    cmd.args(["--set", "uLightAmb-x=abc"])
        .args(["--set", "uLightAmb-w=5"])
        .args(["--set", "uMissing-y=10"]);
    cmd.assert()
        .success()
        .stdout(contains(
            "Rejected uLightAmb-x=abc: `abc` is not a valid channel value",
        ))
        .stdout(contains("Rejected uLightAmb-w=5: unknown channel `w`"))
        .stdout(contains("Ignored uMissing-y=10: no bound control"))
        .stdout(contains(
            " - uLightAmb (Light: Ambient) = (12.75, 12.75, 12.75) [bound]",
        ))
        .stdout(contains("Rendered 2 frame(s)"))
        .stdout(contains("Viewport: 800x600"));
}

#[test]
fn cli_solid_variant_has_no_controls() {
    let mut cmd = harness();
    cmd.arg("--solid");
    cmd.assert()
        .success()
        .stdout(contains("Linked program with 0 uniform control(s)"))
        .stdout(contains(
            "Rendered 1 frame(s): 1 draw call(s), 0 control upload(s)",
        ));
}

#[test]
fn cli_loads_harness_description_with_shader_files() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("quad.vert"), include_str!("../shaders/quad.vert")).unwrap();
    fs::write(
        dir.path().join("tint.frag"),
        "precision mediump float;\nuniform vec3 uTint;\nvoid main() {\n  gl_FragColor = vec4(uTint, 1.0);\n}\n",
    )
    .unwrap();
    let description = dir.path().join("harness.xml");
    fs::write(
        &description,
        r#"<harness>
  <shaders vertex="quad.vert" fragment="tint.frag"/>
  <control uniform="uTint" label="Tint">10 20 30</control>
  <control uniform="uGhost">1 2 3</control>
</harness>
"#,
    )
    .unwrap();

    let mut cmd = harness();
    cmd.arg(&description).args(["--set", "uGhost-z=9"]);
    cmd.assert()
        .success()
        .stdout(contains("Linked program with 2 uniform control(s)"))
        .stdout(contains("Ignored uGhost-z=9: no bound control"))
        .stdout(contains(" - uTint (Tint) = (10.00, 20.00, 30.00) [bound]"))
        .stdout(contains(" - uGhost (uGhost) = (1.00, 2.00, 3.00) [absent]"))
        .stdout(contains(
            "Rendered 2 frame(s): 2 draw call(s), 2 control upload(s)",
        ));
}

#[test]
fn cli_fails_on_broken_shader() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("quad.vert"), include_str!("../shaders/quad.vert")).unwrap();
    fs::write(
        dir.path().join("broken.frag"),
        "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(1.0);\n",
    )
    .unwrap();
    let description = dir.path().join("harness.xml");
    fs::write(
        &description,
        r#"<harness variant="solid"><shaders vertex="quad.vert" fragment="broken.frag"/></harness>"#,
    )
    .unwrap();

    let mut cmd = harness();
    cmd.arg(&description);
    cmd.assert()
        .failure()
        .stderr(contains("failed to initialize renderer"))
        .stderr(contains("failed to compile fragment shader"));
}

#[test]
fn cli_fails_on_error_inside_main() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("quad.vert"), include_str!("../shaders/quad.vert")).unwrap();
    fs::write(
        dir.path().join("typo.frag"),
        "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(1.0, 0.0, 0.0 1.0)\n}\n",
    )
    .unwrap();
    let description = dir.path().join("harness.xml");
    fs::write(
        &description,
        r#"<harness variant="solid"><shaders vertex="quad.vert" fragment="typo.frag"/></harness>"#,
    )
    .unwrap();

    let mut cmd = harness();
    cmd.arg(&description);
    cmd.assert()
        .failure()
        .stderr(contains("failed to compile fragment shader: syntax error"));
}

#[test]
fn cli_rejects_bad_arguments() {
    let mut cmd = harness();
    cmd.args(["--size", "wide"]);
    cmd.assert()
        .failure()
        .stderr(contains("--size expects WxH, got `wide`"));

    let mut cmd = harness();
    cmd.arg("--bogus");
    cmd.assert().failure().stderr(contains("Unknown argument: --bogus"));
}
