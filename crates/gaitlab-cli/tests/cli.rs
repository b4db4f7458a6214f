use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Integration tests for the `gaitlab` binary.
///
/// `gate` is exercised against hand-written milestone reports and
/// `convert-legacy` against a scratch repository. On unix a shell script
/// stands in for the simulator so `run` can be driven end to end.

fn gaitlab() -> Command {
    Command::new(env!("CARGO_BIN_EXE_gaitlab"))
}

const PASSING_REPORT: &str = r#"{
  "milestone_2_single_step_sanity": {
    "passed": true,
    "loss_samples": 2,
    "first_loss": 5.0,
    "last_loss": 3.0,
    "loss_decreased": true,
    "gradient_samples": 3,
    "nonzero_gradients": 2,
    "min_nonzero_gradients": 2
  },
  "milestone_4_full_benchmark_matrix": {
    "passed": true,
    "enabled": true,
    "eval_summaries": 3
  },
  "legacy_removal_gate": {
    "can_remove_legacy_mode": true,
    "requires_docs_update": true,
    "blocking": []
  }
}"#;

#[test]
fn test_gate_replays_passing_report() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("milestones.json"), PASSING_REPORT)?;

    let output = gaitlab().arg("gate").arg(temp_dir.path()).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PASS milestone_2_single_step_sanity"));
    assert!(stdout.contains("PASS milestone_4_full_benchmark_matrix"));
    assert!(stdout.contains("can_remove_legacy_mode: true"));
    assert!(!stdout.contains("milestone_1_inference_parity"));
    Ok(())
}

#[test]
fn test_gate_recomputes_tampered_verdict() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("milestones.json");
    // A failed milestone under a verdict that claims everything passed.
    fs::write(
        &path,
        PASSING_REPORT.replacen("\"passed\": true", "\"passed\": false", 1),
    )?;

    let output = gaitlab().arg("gate").arg(&path).arg("--json").output()?;

    assert!(!output.status.success());
    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(verdict["can_remove_legacy_mode"], false);
    assert_eq!(verdict["blocking"][0], "milestone_2_single_step_sanity");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Legacy removal blocked by: milestone_2_single_step_sanity"));
    Ok(())
}

#[test]
fn test_gate_requires_milestone_report() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = gaitlab().arg("gate").arg(temp_dir.path()).output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read milestone report"));
    Ok(())
}

#[test]
fn test_run_rejects_invalid_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("experiment.yml");
    fs::write(&config, minimal_config("/bin/false", temp_dir.path(), "[]"))?;

    let output = gaitlab().arg("run").arg("--config").arg(&config).output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration validation failed"));
    Ok(())
}

#[test]
fn test_convert_legacy_dry_run_then_apply() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    fs::create_dir_all(root.join("args"))?;
    fs::create_dir_all(root.join("data/policies/dog"))?;
    let arg_file = root.join("args/dog_train.txt");
    fs::write(
        &arg_file,
        "-scenario= train_mace\n-policy_net= nets/dog_actor.prototxt\n-policy_solver= nets/dog_solver.prototxt\n",
    )?;
    fs::write(root.join("data/policies/dog/dog_model.h5"), "weights")?;

    let dry = gaitlab().arg("convert-legacy").arg(root).output()?;
    assert!(dry.status.success());
    let stdout = String::from_utf8_lossy(&dry.stdout);
    assert!(stdout.contains("[DRY-RUN] Wrote manifest:"));
    assert!(stdout.contains("Arg files to update: 1"));
    assert!(stdout.contains("Model checkpoints to copy: 1"));
    let manifest: serde_json::Value = serde_json::from_str(&fs::read_to_string(
        root.join("output/legacy_policy_conversion_manifest.json"),
    )?)?;
    assert_eq!(manifest["dry_run"], true);
    assert!(fs::read_to_string(&arg_file)?.contains("-policy_net="));

    let applied = gaitlab()
        .arg("convert-legacy")
        .arg(root)
        .arg("--apply")
        .arg("--manifest")
        .arg("applied.json")
        .output()?;
    assert!(applied.status.success());
    assert!(String::from_utf8_lossy(&applied.stdout).contains("[APPLY]"));
    assert_eq!(
        fs::read_to_string(&arg_file)?,
        "-scenario= train_mace\n-policy_arch_config= nets/dog_actor.prototxt\n-policy_checkpoint= nets/dog_solver.prototxt\n"
    );
    assert_eq!(fs::read_to_string(root.join("data/policies/dog/dog_model.pt"))?, "weights");
    assert!(root.join("applied.json").is_file());
    Ok(())
}

fn minimal_config(binary: &str, root: &Path, terrains: &str) -> String {
    format!(
        r#"
name: cli_walk
algorithm: mace
seed: 5
binary_path: {binary}
character: dog
controller: dog_mace
state_file: data/states/dog_bind_pose.txt
character_file: data/characters/dog.txt
architecture:
  family: mlp_baseline
curriculum:
  terrain_types: {terrains}
policy_checkpoint_solver: data/policies/dog/nets/dog_solver.prototxt
output_root: {root}/results
templates_dir: {root}/templates
max_iters: 500
milestones:
  short_horizon_iters: 20
"#,
        root = root.display()
    )
}

#[cfg(unix)]
const SIMULATOR_SCRIPT: &str = r#"#!/bin/sh
args="$2"
get() { sed -n "s/^-$1= //p" "$args"; }
case "$(get scenario)" in
  train_*)
    printf 'Iter 0\nAvg Tuple Reward: 0.5\nloss: 2.0\ngrad_norm: 0.3\n'
    printf 'Iter 1\nAvg Tuple Reward: 0.7\nloss: 1.0\ngrad_norm: 0.2\n'
    : > "$(get output_path)"
    ;;
  poli_eval)
    echo "evaluating $(get terrain_file) on $(get policy_backend)"
    out="$(get poli_eval_output)"
    printf '{"terrain":"%s","episodes":20,"avg_dist":2.0,"success_rate":0.8}\n' "$(get terrain_file)" > "$out"
    ;;
  *)
    echo "unknown scenario" >&2
    exit 2
    ;;
esac
"#;

#[cfg(unix)]
#[test]
fn test_run_then_gate_with_script_simulator() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    let templates = root.join("templates");
    fs::create_dir_all(&templates)?;
    for family in ["mlp_baseline", "cnn_baseline", "terrain_attention"] {
        fs::write(templates.join(format!("policy_{family}.prototxt")), "layer {}\n")?;
    }

    let simulator = root.join("sim.sh");
    fs::write(&simulator, SIMULATOR_SCRIPT)?;
    fs::set_permissions(&simulator, fs::Permissions::from_mode(0o755))?;

    let config = root.join("experiment.yml");
    fs::write(
        &config,
        minimal_config(
            &simulator.display().to_string(),
            root,
            "[data/terrain/flat.txt, data/terrain/steps.txt]",
        ),
    )?;

    let output = gaitlab()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--seed")
        .arg("9")
        .output()?;
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(manifest["can_remove_legacy_mode"], true);
    let run_dir = Path::new(manifest["run_dir"].as_str().unwrap()).to_path_buf();
    assert!(
        run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cli_walk_mace_seed9_")
    );

    let train_log = fs::read_to_string(run_dir.join("train.log"))?;
    assert!(train_log.contains("Avg Tuple Reward: 0.7"));
    let train_args = fs::read_to_string(run_dir.join("train_args.txt"))?;
    assert!(train_args.starts_with("-scenario= train_mace\n"));
    assert!(train_args.contains("-trainer_max_iter= 500\n"));
    let short_args = fs::read_to_string(run_dir.join("short_horizon").join("train_args.txt"))?;
    assert!(short_args.contains("-trainer_max_iter= 20\n"));
    assert!(
        fs::read_to_string(run_dir.join("eval_steps.log"))?.contains("on legacy_caffe")
    );

    let gate = gaitlab().arg("gate").arg(&run_dir).output()?;
    assert!(gate.status.success());
    let stdout = String::from_utf8_lossy(&gate.stdout);
    assert!(stdout.contains("PASS milestone_1_inference_parity"));
    assert!(stdout.contains("PASS milestone_3_short_horizon_sanity"));
    Ok(())
}
