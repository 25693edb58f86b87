use async_trait::async_trait;

use super::{Post, PostError, PostSource};

const PLACEHOLDER_IMAGE: &str = "/placeholder.svg?height=400&width=600";

/// The built-in pet posts.
pub struct MockPostSource {
    posts: Vec<Post>,
}

impl MockPostSource {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    pub fn pet_posts() -> Self {
        let posts = [
            (
                1,
                "The Mighty Dire Wolf: Giants of the Ice Age",
                "Dire wolves (Canis dirus) were prehistoric predators that roamed North America during the Pleistocene epoch. These magnificent creatures were larger and more robust than modern wolves, with powerful jaws designed for crushing bones.\n\nUnlike their modern relatives, dire wolves had shorter legs and a more muscular build, making them formidable hunters of megafauna like bison and horses.\n\nThese ancient predators lived in packs and were highly successful hunters. The extinction of dire wolves around 10,000 years ago coincided with the end of the last ice age and the disappearance of the large mammals they depended on for food.",
                1,
                "Dire Wolves",
                "/images/dire-wolves.jpg",
            ),
            (
                2,
                "Understanding Modern Wolf Behavior and Pack Dynamics",
                "Gray wolves (Canis lupus) are highly social animals that live in complex family structures called packs. These intelligent predators communicate through howls, body language, and scent marking.\n\nA typical wolf pack consists of a breeding pair and their offspring from the current and previous years.\n\nTheir howls can be heard up to 6 miles away and serve multiple purposes: coordinating hunts, calling the pack together, and marking territory.",
                2,
                "Modern Wolves",
                PLACEHOLDER_IMAGE,
            ),
            (
                3,
                "From Wolf to Woof: The Amazing Evolution of Dogs",
                "The domestication of dogs began approximately 15,000-40,000 years ago when early humans formed partnerships with wolves. Through selective breeding, humans transformed fierce predators into loyal companions.\n\nThis evolutionary journey resulted in over 300 dog breeds today, each adapted for specific purposes from hunting to herding to companionship.\n\nDogs developed floppy ears, curled tails, and varied coat colors, traits rarely seen in wild wolves.",
                3,
                "Dog Evolution",
                PLACEHOLDER_IMAGE,
            ),
            (
                4,
                "Dire Wolf Fossils: Windows into Prehistoric Life",
                "The La Brea Tar Pits in Los Angeles have yielded thousands of dire wolf fossils, making them one of the most well-represented prehistoric mammals. These fossils reveal that dire wolves had incredibly strong bite forces. Their teeth show wear patterns indicating they were bone-crushers, unlike modern wolves who are primarily flesh-eaters.",
                1,
                "Dire Wolves",
                PLACEHOLDER_IMAGE,
            ),
            (
                5,
                "Wolf Conservation: Protecting Our Wild Heritage",
                "Modern wolf populations have faced significant challenges due to habitat loss and human conflict. Conservation efforts have helped restore wolf populations in places like Yellowstone National Park, where they play a crucial role in maintaining ecosystem balance.",
                2,
                "Modern Wolves",
                PLACEHOLDER_IMAGE,
            ),
            (
                6,
                "The Science Behind Dog Breeds: Genetics and Selection",
                "Modern dog breeds showcase the incredible plasticity of canine genetics. From tiny Chihuahuas to massive Great Danes, all dogs share 99.9% of their DNA with wolves. Selective breeding has emphasized different traits: sight hounds for speed, scent hounds for tracking, and working dogs for strength and endurance.",
                3,
                "Dog Evolution",
                PLACEHOLDER_IMAGE,
            ),
        ]
        .into_iter()
        .map(|(id, title, body, user_id, category, image)| Post {
            id,
            title: title.into(),
            body: body.into(),
            user_id,
            category: category.into(),
            image: image.into(),
        })
        .collect();

        Self::new(posts)
    }
}

#[async_trait]
impl PostSource for MockPostSource {
    async fn fetch_posts(&self) -> Result<Vec<Post>, PostError> {
        Ok(self.posts.clone())
    }
}
