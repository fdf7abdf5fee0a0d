use crate::lane::VehicleId;

/// Nearest vehicle ahead or behind, with the (always positive) longitudinal gap.
#[derive(Clone, Debug, PartialEq)]
pub struct NearestVehicle {
    pub id: VehicleId,
    pub gap: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NearestPair {
    pub leader: Option<NearestVehicle>,
    pub follower: Option<NearestVehicle>,
}

fn closer(candidate_gap: f64, candidate_id: &VehicleId, best: &Option<NearestVehicle>) -> bool {
    match best {
        None => true,
        Some(best) => {
            candidate_gap < best.gap || (candidate_gap == best.gap && candidate_id < &best.id)
        }
    }
}

/// Finds the leader (smallest positive displacement) and follower (smallest
/// negative displacement in magnitude) among `occupants`, given as
/// `(id, longitudinal position)` pairs. Input order does not matter; exact
/// ties go to the lowest id. A vehicle at the ego's own position is neither,
/// and the ego itself is skipped by id.
pub fn find_neighbors<'a, I>(ego: &VehicleId, ego_position: f64, occupants: I) -> NearestPair
where
    I: IntoIterator<Item = (&'a VehicleId, f64)>,
{
    let mut pair = NearestPair::default();

    for (id, position) in occupants {
        if id == ego {
            continue;
        }

        let displacement = position - ego_position;
        if displacement > 0.0 {
            if closer(displacement, id, &pair.leader) {
                pair.leader = Some(NearestVehicle {
                    id: id.clone(),
                    gap: displacement,
                });
            }
        } else if displacement < 0.0 {
            let gap = -displacement;
            if closer(gap, id, &pair.follower) {
                pair.follower = Some(NearestVehicle {
                    id: id.clone(),
                    gap,
                });
            }
        }
    }

    pair
}
