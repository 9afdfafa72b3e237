//! Fixed datasets: static globe layers and fallbacks for live feeds.

use async_trait::async_trait;

use crate::aggregator::{Point, RemoteFeed};
use crate::error::Result;

/// A feed backed by a fixed dataset. Never fails.
pub struct StaticFeed {
  name: &'static str,
  points: fn() -> Vec<Point>,
}

impl StaticFeed {
  pub fn new(name: &'static str, points: fn() -> Vec<Point>) -> Self {
    Self { name, points }
  }

  pub fn volcanoes() -> Self {
    Self::new("volcanoes", volcanoes)
  }

  pub fn satellites() -> Self {
    Self::new("satellites", satellites)
  }

  pub fn airports() -> Self {
    Self::new("airports", airports)
  }
}

#[async_trait]
impl RemoteFeed for StaticFeed {
  fn name(&self) -> &str {
    self.name
  }

  async fn fetch(&self) -> Result<Vec<Point>> {
    Ok((self.points)())
  }

  fn fallback(&self) -> Vec<Point> {
    (self.points)()
  }
}

fn described(lat: f64, lng: f64, name: &str, kind: &str, description: &str) -> Point {
  Point::new(lat, lng, name, kind).with("description", description)
}

pub fn volcanoes() -> Vec<Point> {
  [
    (19.4211, -155.2871, "Kilauea", "Shield Volcano", "Active shield volcano in Hawaii"),
    (40.8225, 14.4289, "Mount Vesuvius", "Stratovolcano", "Famous volcano in Italy"),
    (35.3606, 138.7274, "Mount Fuji", "Stratovolcano", "Iconic volcano in Japan"),
    (-1.2921, 36.8219, "Mount Kenya", "Stratovolcano", "Extinct volcano in Kenya"),
    (63.6314, -19.6083, "Eyjafjallajökull", "Stratovolcano", "Icelandic volcano"),
    (14.3814, -90.6011, "Pacaya", "Stratovolcano", "Active volcano in Guatemala"),
    (-8.3431, 115.5071, "Mount Agung", "Stratovolcano", "Active volcano in Bali"),
    (55.4173, -161.8937, "Mount Pavlof", "Stratovolcano", "Alaskan volcano"),
    (46.1912, -122.1944, "Mount St. Helens", "Stratovolcano", "Famous eruption in 1980"),
    (19.0233, -98.6222, "Popocatépetl", "Stratovolcano", "Active volcano in Mexico"),
  ]
  .into_iter()
  .map(|(lat, lng, name, kind, description)| described(lat, lng, name, kind, description))
  .collect()
}

pub fn satellites() -> Vec<Point> {
  [
    (0.0, 0.0, "ISS", 408, "Space Station", "International Space Station"),
    (20.0, 45.0, "GPS Satellite", 20200, "Navigation", "Global Positioning System"),
    (-30.0, 120.0, "Weather Sat", 35786, "Weather", "Geostationary weather satellite"),
    (60.0, -90.0, "Comm Sat", 35786, "Communication", "Communication satellite"),
    (-45.0, 180.0, "Research Sat", 500, "Research", "Scientific research satellite"),
    (10.0, 30.0, "Earth Observation", 700, "Observation", "Earth observation satellite"),
    (-20.0, 60.0, "Climate Sat", 800, "Climate", "Climate monitoring satellite"),
    (40.0, -120.0, "Military Sat", 1000, "Military", "Military satellite"),
    (-60.0, 90.0, "Science Sat", 600, "Science", "Scientific satellite"),
    (30.0, -60.0, "Broadcast Sat", 35786, "Broadcast", "Broadcast satellite"),
  ]
  .into_iter()
  .map(|(lat, lng, name, altitude_km, kind, description)| {
    described(lat, lng, name, kind, description).with("altitude_km", altitude_km)
  })
  .collect()
}

pub fn airports() -> Vec<Point> {
  [
    (40.6413, -73.7781, "JFK Airport", 13, "John F. Kennedy International Airport"),
    (51.4700, -0.4543, "Heathrow", 83, "London Heathrow Airport"),
    (35.5494, 139.7798, "Haneda Airport", 35, "Tokyo Haneda Airport"),
    (-33.9399, 151.1753, "Sydney Airport", 21, "Sydney Airport"),
    (55.6180, 12.6508, "Copenhagen Airport", 17, "Copenhagen Airport"),
    (49.0097, 2.5479, "Charles de Gaulle", 119, "Paris Charles de Gaulle Airport"),
    (52.3105, 4.7683, "Schiphol", -3, "Amsterdam Airport Schiphol"),
    (41.8003, 12.2389, "Fiumicino", 15, "Rome Fiumicino Airport"),
    (40.4983, -3.5676, "Barajas", 610, "Madrid Barajas Airport"),
    (37.6189, -122.3750, "SFO", 13, "San Francisco International Airport"),
  ]
  .into_iter()
  .map(|(lat, lng, name, elevation_m, description)| {
    described(lat, lng, name, "International", description).with("elevation_m", elevation_m)
  })
  .collect()
}

/// Substitute for the earthquake feed.
pub fn fallback_earthquakes() -> Vec<Point> {
  [
    (36.2048, 138.2529, "Japan Earthquake", 7.2, "Recent earthquake in Japan"),
    (40.7128, -74.0060, "New York Quake", 4.5, "Minor earthquake in New York"),
    (34.0522, -118.2437, "LA Earthquake", 6.1, "California earthquake"),
    (51.5074, -0.1278, "London Quake", 3.2, "Minor earthquake in London"),
    (-33.8688, 151.2093, "Sydney Quake", 5.8, "Australian earthquake"),
  ]
  .into_iter()
  .map(|(lat, lng, name, magnitude, description)| {
    described(lat, lng, name, "Earthquake", description).with("magnitude", magnitude)
  })
  .collect()
}

/// A city sampled by the weather feed, with typical conditions used when the
/// live reading is unavailable.
#[derive(Debug, Clone, Copy)]
pub struct City {
  pub name: &'static str,
  pub lat: f64,
  pub lng: f64,
  pub temperature: f64,
  pub humidity: u32,
  pub pressure: u32,
  pub wind_speed: f64,
}

impl City {
  pub fn fallback_point(&self) -> Point {
    Point::new(
      self.lat,
      self.lng,
      format!("{} Weather", self.name),
      "Weather Station",
    )
    .with("temperature", self.temperature)
    .with("humidity", self.humidity)
    .with("pressure", self.pressure)
    .with("wind_speed", self.wind_speed)
    .with("description", "Typical conditions")
  }
}

const fn city(
  name: &'static str,
  lat: f64,
  lng: f64,
  temperature: f64,
  humidity: u32,
  pressure: u32,
  wind_speed: f64,
) -> City {
  City {
    name,
    lat,
    lng,
    temperature,
    humidity,
    pressure,
    wind_speed,
  }
}

pub const CITIES: [City; 10] = [
  city("New York", 40.7128, -74.0060, 13.0, 63, 1017, 4.6),
  city("London", 51.5074, -0.1278, 11.5, 76, 1013, 4.1),
  city("Tokyo", 35.6762, 139.6503, 16.4, 65, 1014, 3.3),
  city("Sydney", -33.8688, 151.2093, 18.6, 67, 1016, 4.8),
  city("Moscow", 55.7558, 37.6176, 6.4, 77, 1016, 3.0),
  city("Paris", 48.8566, 2.3522, 12.5, 72, 1016, 3.6),
  city("Berlin", 52.5200, 13.4050, 10.3, 74, 1015, 3.7),
  city("Rome", 41.9028, 12.4964, 15.8, 70, 1015, 3.2),
  city("Madrid", 40.4168, -3.7038, 15.0, 57, 1016, 2.9),
  city("Amsterdam", 52.3676, 4.9041, 10.8, 80, 1014, 5.2),
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_datasets_are_deterministic() {
    assert_eq!(volcanoes(), volcanoes());
    assert_eq!(fallback_earthquakes(), fallback_earthquakes());
    assert_eq!(CITIES[0].fallback_point(), CITIES[0].fallback_point());
  }

  #[test]
  fn test_dataset_sizes() {
    assert_eq!(volcanoes().len(), 10);
    assert_eq!(satellites().len(), 10);
    assert_eq!(airports().len(), 10);
    assert_eq!(fallback_earthquakes().len(), 5);
  }

  #[tokio::test]
  async fn test_static_feed_serves_dataset() {
    let feed = StaticFeed::airports();
    assert_eq!(feed.fetch().await.unwrap(), airports());
    assert_eq!(feed.fallback(), airports());
  }
}
