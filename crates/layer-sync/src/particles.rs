// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Animated wind particle field.
//!
//! Particles live in the texture's normalized space (`x` west to east, `y`
//! north to south, both `0.0..=1.0`) and are advected by the sampled wind
//! once per frame. Rendering is up to the map surface.

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::hour::HourIndex;
use crate::surface::LngLat;
use crate::texture::{ValueRange, WindTexture};

/// Normalized displacement per frame for 1 m/s at speed factor 1.0 over a
/// 360 degree span.
const VELOCITY_SCALE: f32 = 1.0e-4;

/// Geographic extent covered by a wind texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    /// True when the bounds wrap all the way around the globe.
    #[must_use]
    pub fn wraps(&self) -> bool {
        (self.east - self.west - 360.0).abs() < 1e-9
    }
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
        }
    }
}

/// Fixed parameters of the particle overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFieldConfig {
    /// Number of live particles
    pub particle_count: usize,

    /// Frames a particle lives before it is respawned
    pub max_age: u32,

    /// Multiplier on the wind speed when advecting
    pub speed_factor: f32,

    /// Trail line width in pixels
    pub line_width: f32,

    /// Trail opacity (0.0 - 1.0)
    pub opacity: f32,

    /// Decoding range of the texture channels
    pub value_range: ValueRange,

    /// Extent of the texture
    pub bounds: GeoBounds,

    /// Seed for particle placement
    pub seed: u64,
}

impl Default for ParticleFieldConfig {
    fn default() -> Self {
        Self {
            particle_count: 4000,
            max_age: 80,
            speed_factor: 0.4,
            line_width: 1.2,
            opacity: 0.85,
            value_range: ValueRange::default(),
            bounds: GeoBounds::default(),
            seed: 0x5eed,
        }
    }
}

/// One particle, with its position from the previous frame for trail drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    pub age: u32,
}

impl Particle {
    /// True when the last step jumped across the antimeridian or respawned,
    /// in which case no trail segment should be drawn.
    #[must_use]
    pub fn jumped(&self) -> bool {
        self.age == 0 || (self.x - self.prev_x).abs() > 0.5
    }
}

/// Particle renderer state for one hour's wind texture.
#[derive(Debug)]
pub struct ParticleLayer {
    hour: HourIndex,
    texture: Arc<WindTexture>,
    config: ParticleFieldConfig,
    particles: Vec<Particle>,
    rng: ChaCha8Rng,
}

impl ParticleLayer {
    #[must_use]
    pub fn new(hour: HourIndex, texture: Arc<WindTexture>, config: ParticleFieldConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed ^ u64::from(hour.value()));
        let max_age = config.max_age.max(1);
        let particles = (0..config.particle_count)
            .map(|_| {
                let x = rng.gen::<f32>();
                let y = rng.gen::<f32>();
                Particle {
                    x,
                    y,
                    prev_x: x,
                    prev_y: y,
                    age: rng.gen_range(0..max_age),
                }
            })
            .collect();

        Self {
            hour,
            texture,
            config,
            particles,
            rng,
        }
    }

    /// Hour whose texture drives this layer.
    #[must_use]
    pub fn hour(&self) -> HourIndex {
        self.hour
    }

    #[must_use]
    pub fn texture(&self) -> &WindTexture {
        &self.texture
    }

    #[must_use]
    pub fn config(&self) -> &ParticleFieldConfig {
        &self.config
    }

    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advance every particle by one frame.
    pub fn step(&mut self) {
        let bounds = self.config.bounds;
        let scale = self.config.speed_factor * VELOCITY_SCALE;
        let dx_scale = scale * (360.0 / (bounds.east - bounds.west)) as f32;
        let dy_scale = scale * (360.0 / (bounds.north - bounds.south)) as f32;
        let wraps = bounds.wraps();

        for i in 0..self.particles.len() {
            let particle = self.particles[i];
            let next = if particle.age >= self.config.max_age {
                None
            } else {
                self.texture.sample(particle.x, particle.y).and_then(|(u, v)| {
                    let mut x = particle.x + u * dx_scale;
                    let y = particle.y - v * dy_scale;
                    if wraps {
                        x = x.rem_euclid(1.0);
                    }
                    ((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)).then_some(Particle {
                        x,
                        y,
                        prev_x: particle.x,
                        prev_y: particle.y,
                        age: particle.age + 1,
                    })
                })
            };

            let particle = match next {
                Some(particle) => particle,
                None => self.respawn(),
            };
            self.particles[i] = particle;
        }
    }

    fn respawn(&mut self) -> Particle {
        let x = self.rng.gen::<f32>();
        let y = self.rng.gen::<f32>();
        Particle {
            x,
            y,
            prev_x: x,
            prev_y: y,
            age: 0,
        }
    }

    /// Geographic position of a normalized texture coordinate.
    #[must_use]
    pub fn to_lnglat(&self, x: f32, y: f32) -> LngLat {
        let b = self.config.bounds;
        LngLat {
            lng: b.west + f64::from(x) * (b.east - b.west),
            lat: b.north - f64::from(y) * (b.north - b.south),
        }
    }

    /// Wind speed under a particle, used for trail colouring.
    #[must_use]
    pub fn speed_at(&self, particle: &Particle) -> f32 {
        self.texture.speed(particle.x, particle.y).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::tests::uniform_texture;

    fn config(count: usize) -> ParticleFieldConfig {
        ParticleFieldConfig {
            particle_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_layer_seeds_configured_count() {
        let layer = ParticleLayer::new(
            HourIndex::new(4).unwrap(),
            Arc::new(uniform_texture([128, 128, 0, 255])),
            config(250),
        );
        assert_eq!(layer.particles().len(), 250);
        assert_eq!(layer.hour().value(), 4);
        assert!(layer
            .particles()
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)));
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let texture = Arc::new(uniform_texture([128, 128, 0, 255]));
        let a = ParticleLayer::new(HourIndex::MIN, Arc::clone(&texture), config(32));
        let b = ParticleLayer::new(HourIndex::MIN, texture, config(32));
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn test_eastward_wind_moves_particles_east() {
        // u = +30 m/s, v = 0 (128 decodes to ~0.12 m/s)
        let mut layer = ParticleLayer::new(
            HourIndex::MIN,
            Arc::new(uniform_texture([255, 128, 0, 255])),
            ParticleFieldConfig {
                particle_count: 64,
                max_age: 1000,
                ..Default::default()
            },
        );
        let before: Vec<Particle> = layer.particles().to_vec();
        layer.step();

        for (old, new) in before.iter().zip(layer.particles()) {
            if new.age == 0 {
                continue;
            }
            let moved = (new.x - old.x).rem_euclid(1.0);
            assert!(moved > 0.0 && moved < 0.01, "moved {moved}");
            assert_eq!(new.prev_x, old.x);
        }
    }

    #[test]
    fn test_no_data_respawns_particles() {
        let mut layer = ParticleLayer::new(
            HourIndex::MIN,
            Arc::new(uniform_texture([255, 255, 0, 0])),
            config(40),
        );
        layer.step();
        assert!(layer.particles().iter().all(|p| p.age == 0 && p.jumped()));
    }

    #[test]
    fn test_old_particles_respawn() {
        let mut layer = ParticleLayer::new(
            HourIndex::MIN,
            Arc::new(uniform_texture([128, 128, 0, 255])),
            ParticleFieldConfig {
                particle_count: 16,
                max_age: 1,
                ..Default::default()
            },
        );
        // ages start in 0..1, so every particle is 0 and survives one step
        layer.step();
        assert!(layer.particles().iter().all(|p| p.age == 1));
        layer.step();
        assert!(layer.particles().iter().all(|p| p.age == 0));
    }

    #[test]
    fn test_to_lnglat_corners() {
        let layer = ParticleLayer::new(
            HourIndex::MIN,
            Arc::new(uniform_texture([128, 128, 0, 255])),
            config(0),
        );
        let nw = layer.to_lnglat(0.0, 0.0);
        assert_eq!((nw.lng, nw.lat), (-180.0, 90.0));
        let se = layer.to_lnglat(1.0, 1.0);
        assert_eq!((se.lng, se.lat), (180.0, -90.0));
    }
}
