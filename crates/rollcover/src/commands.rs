use std::path::Path;

use anyhow::{Context, Result};
use minimal_activations::{
    find_minimal_activations, ActivationsGraph, Decomposer, DecompositionConfig,
};
use piano_roll::{dilate_stack, erode_texture, ActivationsStack, PianoRoll, Texture};
use tracing::info;

use crate::scene::Scene;

fn load(path: &Path) -> Result<(Scene, Texture, PianoRoll)> {
    let scene = Scene::load(path)?;
    let texture = scene.texture()?;
    let roll = scene.roll(&texture)?;
    Ok((scene, texture, roll))
}

fn print_stack(stack: &ActivationsStack) {
    for (voice, activations) in stack.iter().enumerate() {
        let points: Vec<String> = activations
            .points()
            .iter()
            .map(|(t, f)| format!("{t}:{f}"))
            .collect();
        println!("  voice {voice}: {}", points.join(" "));
    }
}

pub fn render(path: &Path) -> Result<()> {
    let (_, _, roll) = load(path)?;
    let roll = roll.reduce();
    let extent = roll.extent();
    println!(
        "tatum {}  step {}  time {}..{}  frequency {}..{}",
        roll.tatum(),
        roll.step(),
        roll.time_at(extent.time.0),
        roll.time_at(extent.time.1),
        roll.frequency_at(extent.frequency.0),
        roll.frequency_at(extent.frequency.1),
    );
    print!("{roll}");
    Ok(())
}

pub fn erode(path: &Path) -> Result<()> {
    let (_, texture, roll) = load(path)?;
    let eroded = erode_texture(&roll, &texture).context("eroding roll by texture")?;
    println!("{} candidate activations", eroded.total());
    print_stack(&eroded);
    Ok(())
}

pub fn decompose(path: &Path, config: &DecompositionConfig, checkpoint: bool) -> Result<()> {
    let (scene, texture, roll) = load(path)?;
    let eroded = erode_texture(&roll, &texture).context("eroding roll by texture")?;
    let graph = ActivationsGraph::build(&roll, &eroded, &texture, config.scan)
        .context("building activation graph")?;
    info!(
        clusters = graph.clusters().len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        scan = %config.scan,
        "activation graph ready"
    );

    let options = config.search_options();
    let result = if checkpoint || config.checkpoint_db.is_some() {
        let run = format!("{}:{}", scene.run_name(path), config.scan);
        Decomposer::from_config(config, &run)?.decompose(&graph, &options)?
    } else {
        find_minimal_activations(&graph, &options)?
    };

    if result.is_empty() {
        println!("no covering activations at order {}", result.order);
        return Ok(());
    }

    let target = roll.reduce();
    for (i, (path, stack)) in result.paths.iter().zip(&result.stacks).enumerate() {
        let rebuilt = dilate_stack(stack, &texture)?.reduce();
        println!(
            "path {i}: cost {}, {} activations, reconstructs roll: {}",
            path.cost,
            stack.total(),
            if rebuilt == target { "yes" } else { "no" }
        );
        print_stack(stack);
    }
    Ok(())
}
