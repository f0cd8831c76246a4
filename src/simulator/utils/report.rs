use sim::models::{Model, Reportable};
use sim::simulator::Simulation;

pub fn print_simulation_records(simulation: &mut Simulation) {
  println!("\n--- Simulation Records ---");

  for model in simulation.models().iter() {
    print_model_records(model);
  }

  println!("--- End Records ---\n");
}

fn print_model_records(model: &Model) {
  let records = model.records();
  if !records.is_empty() {
    println!("\n[{}]", model.id());
    for record in records {
      println!("  Time {:.1}: {} {}", record.time, record.action, record.subject);
    }
  }
}

/// One line per model: id and its status snapshot.
pub fn print_status(simulation: &mut Simulation) {
  for model in simulation.models().iter() {
    println!("{:<28} {}", model.id(), model.status());
  }
}
