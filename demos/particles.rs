//! Example: particle emitter on top of a recycling pool
//!
//! Every tick the emitter checks a few particles out of the pool, the
//! physics system moves every live particle and frees it once its lifetime
//! runs out. Run with `--features profiling` and `RUST_LOG=trace` to see the
//! pool and system events.

use recycle_ecs::prelude::*;

#[derive(Debug, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Default)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Default)]
struct Lifetime {
    remaining: f32,
}

const GRAVITY: f32 = -9.8;
const DT: f32 = 1.0 / 30.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let physics = System::builder(|_, particle: &Entity, dt: &f32| {
        let (Some(pos), Some(vel)) = (particle.get::<Position>(), particle.get::<Velocity>())
        else {
            return;
        };
        {
            let mut pos = pos.borrow_mut();
            let mut vel = vel.borrow_mut();
            vel.y += GRAVITY * dt;
            pos.x += vel.x * dt;
            pos.y += vel.y * dt;
        }

        let expired = particle
            .with_component_mut::<Lifetime, _>(|life| {
                life.remaining -= dt;
                life.remaining <= 0.0
            })
            .unwrap_or(true);
        if expired {
            particle.free();
        }
    })
    .name("physics")
    .requires::<(Position, Velocity, Lifetime)>()
    .build();

    let pool = Pool::builder(64)
        .template(Template::of::<(Position, Velocity, Lifetime)>())
        .bind(&physics)
        .on_clean(|particle| {
            particle
                .set_fields::<Position>(|pos| *pos = Position::default())
                .ok();
        })
        .build()?;

    let mut spawned = 0u32;
    for tick in 0..90 {
        for _ in 0..4 {
            let Some(particle) = pool.get() else {
                break;
            };
            let spread = (spawned % 7) as f32 - 3.0;
            particle.set_fields::<Velocity>(|vel| {
                vel.x = spread;
                vel.y = 6.0;
            })?;
            particle.set_fields::<Lifetime>(|life| {
                life.remaining = 1.0 + (spawned % 3) as f32 * 0.25;
            })?;
            spawned += 1;
        }

        physics.run(&DT);

        if tick % 15 == 0 {
            println!(
                "tick {tick:>3}: live={:>2} available={:>2} spawned={spawned}",
                physics.len(),
                pool.available_len()
            );
        }
    }

    pool.free_all();
    println!("done: {spawned} particles from a pool of {}", pool.capacity());
    Ok(())
}
